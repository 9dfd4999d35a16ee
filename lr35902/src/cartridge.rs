//! Cartridges themselves contain some hardware. The CPU assigns the address space 0x0000 ... 0x7FFF and 0xA000 ...
//! 0xBFFF to the cartridge. Reads/writes to that space are handled by whatever chip is sitting inside the cartridge.
//! Some are extremely basic and only allow reads from onboard ROM. Others have persistent RAM (which is used for
//! savegames), or giant amounts of ROM that get paged into the available space via writes to the ROM region. We
//! implement the various types of MBCs (Memory Bank Controllers) here.
//!
//! An `Mbc` carries no state of its own. The bank-select latches and the offsets they resolve to live in
//! `HardwareState::banks`, so switching banks is just updating a couple of integers there.

use crate::error::Fault;
use crate::hardware::HardwareState;
use crate::rom::{RAM_BANK_SIZE, ROM_BANK_SIZE};
use log::trace;

/// Emulated clock ticks per second of real-time-clock time.
const RTC_TICKS_PER_SECOND: u32 = 4_194_304;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mbc {
    NoMbc,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

impl Mbc {
    /// Reads from the 0x0000 - 0x7FFF ROM window.
    pub fn read_rom(self, hw: &HardwareState, addr: u16) -> u8 {
        let addr = usize::from(addr);
        if addr < ROM_BANK_SIZE {
            hw.rom[hw.banks.rom_bank0_offset + addr]
        } else {
            hw.rom[hw.banks.rom_bank1_offset + addr - ROM_BANK_SIZE]
        }
    }

    /// Reads from the 0xA000 - 0xBFFF RAM window. `addr` is relative to the start of the window.
    pub fn read_ram(self, hw: &HardwareState, addr: u16) -> u8 {
        if !hw.banks.ram_enabled {
            return 0xFF;
        }

        match self {
            Mbc::Mbc2 => {
                // The built-in RAM is 512 half-bytes, repeated throughout the window. The upper nibble is open bus.
                0xF0 | hw.cart_ram[usize::from(addr) & 0x1FF]
            }
            Mbc::Mbc3 if hw.banks.ram_select >= 0x08 => {
                let reg = usize::from(hw.banks.ram_select - 0x08);
                hw.rtc.latched[reg]
            }
            _ => hw
                .cart_ram
                .get(hw.banks.ram_offset + usize::from(addr))
                .copied()
                .unwrap_or(0xFF),
        }
    }

    /// Handles a write to the ROM window. These never modify ROM, instead they're commands to the bank controller.
    pub fn write_rom(self, hw: &mut HardwareState, addr: u16, v: u8) {
        match self {
            Mbc::NoMbc => {}
            Mbc::Mbc1 => mbc1_write(hw, addr, v),
            Mbc::Mbc2 => mbc2_write(hw, addr, v),
            Mbc::Mbc3 => mbc3_write(hw, addr, v),
            Mbc::Mbc5 => mbc5_write(hw, addr, v),
        }
    }

    /// Writes to the 0xA000 - 0xBFFF RAM window. `addr` is relative to the start of the window.
    pub fn write_ram(self, hw: &mut HardwareState, addr: u16, v: u8) {
        if !hw.banks.ram_enabled {
            return;
        }

        match self {
            Mbc::Mbc2 => {
                hw.cart_ram[usize::from(addr) & 0x1FF] = v & 0x0F;
            }
            Mbc::Mbc3 if hw.banks.ram_select >= 0x08 => {
                let reg = hw.banks.ram_select - 0x08;
                rtc_write(hw, reg, v);
                return;
            }
            _ => {
                let idx = hw.banks.ram_offset + usize::from(addr);
                match hw.cart_ram.get_mut(idx) {
                    Some(b) => *b = v,
                    None => return,
                }
            }
        }

        if hw.has_battery {
            hw.battery_dirty = true;
        }
    }

    /// Advances the cartridge's own clock by a single base clock tick. Only MBC3 carts with a timer have one.
    pub fn clock(self, hw: &mut HardwareState) {
        if self != Mbc::Mbc3 || !hw.has_rtc {
            return;
        }

        let rtc = &mut hw.rtc;
        if rtc.day_hi & 0x40 != 0 {
            return;
        }

        rtc.subsecond += 1;
        if rtc.subsecond < RTC_TICKS_PER_SECOND {
            return;
        }
        rtc.subsecond = 0;

        // The counters are plain binary counters of fixed width. If software has written an out of range value, they
        // keep counting up until they wrap at their bit width without carrying into the next counter.
        rtc.seconds = (rtc.seconds + 1) & 0x3F;
        if rtc.seconds != 60 {
            return;
        }
        rtc.seconds = 0;
        rtc.minutes = (rtc.minutes + 1) & 0x3F;
        if rtc.minutes != 60 {
            return;
        }
        rtc.minutes = 0;
        rtc.hours = (rtc.hours + 1) & 0x1F;
        if rtc.hours != 24 {
            return;
        }
        rtc.hours = 0;

        let day = (u16::from(rtc.day_hi & 1) << 8 | u16::from(rtc.day_lo)) + 1;
        rtc.day_lo = day as u8;
        rtc.day_hi = (rtc.day_hi & 0xFE) | ((day >> 8) & 1) as u8;
        if day > 0x1FF {
            rtc.day_hi |= 0x80;
        }
    }
}

/// Points the RAM window at the given bank, wrapping around the amount of RAM actually on the cartridge.
fn select_ram_bank(hw: &mut HardwareState, bank: usize) {
    hw.banks.ram_offset = (bank % hw.ram_banks().max(1)) * RAM_BANK_SIZE;
}

fn mbc1_write(hw: &mut HardwareState, addr: u16, v: u8) {
    match addr {
        0x0000..=0x1FFF => {
            hw.banks.ram_enabled = v & 0x0F == 0x0A;
        }
        0x2000..=0x3FFF => {
            // Only 5 bits are used for this register.
            hw.banks.rom_select_lo = v & 0b1_1111;
        }
        0x4000..=0x5FFF => {
            // Only the low 2 bits are used for this register.
            hw.banks.rom_select_hi = v & 0b11;
        }
        _ => {
            hw.banks.mode = v & 1 == 1;
        }
    }

    let banks = &mut hw.banks;

    // Bank 0 can't be selected in the switchable window. The check only looks at the low 5 bits, which is why banks
    // 0x20, 0x40 and 0x60 are unreachable too: they all map to the bank after them.
    let lo = banks.rom_select_lo.max(1);
    let hi = usize::from(banks.rom_select_hi) << 5;

    banks.rom_bank1_offset = ((hi | usize::from(lo)) % hw.rom_banks) * ROM_BANK_SIZE;

    // In mode 1, the secondary select also applies to the fixed 0x0000 window (large ROMs) and to the RAM bank.
    let secondary = if banks.mode { banks.rom_select_hi } else { 0 };
    banks.rom_bank0_offset = if banks.mode { (hi % hw.rom_banks) * ROM_BANK_SIZE } else { 0 };
    select_ram_bank(hw, usize::from(secondary));

    trace!(
        "MBC1 banks: lo={:#x} hi={:#x} mode={} rom0={:#x} rom1={:#x} ram={:#x}",
        hw.banks.rom_select_lo,
        hw.banks.rom_select_hi,
        hw.banks.mode,
        hw.banks.rom_bank0_offset,
        hw.banks.rom_bank1_offset,
        hw.banks.ram_offset
    );
}

fn mbc2_write(hw: &mut HardwareState, addr: u16, v: u8) {
    if addr >= 0x4000 {
        return;
    }

    // Bit 8 of the address decides which register is being written.
    if addr & 0x100 == 0 {
        hw.banks.ram_enabled = v & 0x0F == 0x0A;
    } else {
        let bank = (v & 0x0F).max(1);
        hw.banks.rom_select_lo = bank;
        hw.banks.rom_bank1_offset = (usize::from(bank) % hw.rom_banks) * ROM_BANK_SIZE;
        trace!("MBC2 ROM bank {:#x}", bank);
    }
}

fn mbc3_write(hw: &mut HardwareState, addr: u16, v: u8) {
    match addr {
        0x0000..=0x1FFF => {
            hw.banks.ram_enabled = v & 0x0F == 0x0A;
        }
        0x2000..=0x3FFF => {
            let bank = (v & 0x7F).max(1);
            hw.banks.rom_select_lo = bank;
            hw.banks.rom_bank1_offset = (usize::from(bank) % hw.rom_banks) * ROM_BANK_SIZE;
            trace!("MBC3 ROM bank {:#x}", bank);
        }
        0x4000..=0x5FFF => match v {
            0x00..=0x07 => {
                hw.banks.ram_select = v;
                select_ram_bank(hw, usize::from(v));
            }
            0x08..=0x0C => {
                hw.banks.ram_select = v;
            }
            _ => hw.raise(Fault::InvalidRamSelect(v)),
        },
        _ => {
            // Writing 0 then 1 copies the live clock counters into the latched registers that reads see.
            let rtc = &mut hw.rtc;
            if rtc.latch_armed && v == 1 {
                rtc.latched = [rtc.seconds, rtc.minutes, rtc.hours, rtc.day_lo, rtc.day_hi];
            }
            rtc.latch_armed = v == 0;
        }
    }
}

fn mbc5_write(hw: &mut HardwareState, addr: u16, v: u8) {
    match addr {
        0x0000..=0x1FFF => {
            hw.banks.ram_enabled = v & 0x0F == 0x0A;
        }
        0x2000..=0x2FFF => {
            hw.banks.rom_select_lo = v;
        }
        0x3000..=0x3FFF => {
            hw.banks.rom_select_hi = v & 1;
        }
        0x4000..=0x5FFF => {
            hw.banks.ram_select = v & 0x0F;
            select_ram_bank(hw, usize::from(v & 0x0F));
            return;
        }
        _ => return,
    }

    // Unlike the older controllers, MBC5 happily maps bank 0 into the switchable window.
    let bank = usize::from(hw.banks.rom_select_hi) << 8 | usize::from(hw.banks.rom_select_lo);
    hw.banks.rom_bank1_offset = (bank % hw.rom_banks) * ROM_BANK_SIZE;
    trace!("MBC5 ROM bank {:#x}", bank);
}

fn rtc_write(hw: &mut HardwareState, reg: u8, v: u8) {
    let rtc = &mut hw.rtc;
    match reg {
        0 => {
            rtc.seconds = v & 0x3F;
            rtc.subsecond = 0;
        }
        1 => rtc.minutes = v & 0x3F,
        2 => rtc.hours = v & 0x1F,
        3 => rtc.day_lo = v,
        _ => rtc.day_hi = v & 0xC1,
    }
}
