//! The 16-bit memory bus the CPU is connected to. Every address resolves to exactly one backing region, so reads and
//! writes can't fail: the handful of holes in the map just read back 0xFF and swallow writes.
//!
//! Resolving is done through a routing table with one entry per address. The table only changes when the display
//! component hides or reveals VRAM/OAM, or when someone installs a `MemoryHandler` over an address. Bank switches
//! don't touch it at all, since the bank offsets themselves live in `HardwareState`.

use crate::cartridge::Mbc;
use crate::dma::DmaController;
use crate::hardware::HardwareState;
use crate::timer::Timer;

/// External components (display, sound, joypad, serial port) install one of these over the memory-mapped registers
/// they own. The core then forwards every access of that address without knowing what it means.
pub trait MemoryHandler {
    fn read(&mut self, hw: &HardwareState, addr: u16) -> u8;
    fn write(&mut self, hw: &mut HardwareState, addr: u16, v: u8);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    Rom,             // 0x0000 - 0x7FFF
    Vram,            // 0x8000 - 0x9FFF
    CartRam,         // 0xA000 - 0xBFFF
    Wram0,           // 0xC000 - 0xCFFF, echoed at 0xE000 - 0xEFFF
    WramN,           // 0xD000 - 0xDFFF, echoed at 0xF000 - 0xFDFF
    Oam,             // 0xFE00 - 0xFE9F
    Unusable,        // 0xFEA0 - 0xFEFF
    Io,              // 0xFF00 - 0xFF7F
    Hram,            // 0xFF80 - 0xFFFE
    InterruptEnable, // 0xFFFF
    Blocked,         // VRAM or OAM while the display has it locked.
    Hook(usize),     // Index into Bus::hooks.
}

/// Where an address lives when nothing is hidden and nothing is hooked.
fn static_route(addr: u16) -> Route {
    match addr {
        0x0000..=0x7FFF => Route::Rom,
        0x8000..=0x9FFF => Route::Vram,
        0xA000..=0xBFFF => Route::CartRam,
        0xC000..=0xCFFF | 0xE000..=0xEFFF => Route::Wram0,
        0xD000..=0xDFFF | 0xF000..=0xFDFF => Route::WramN,
        0xFE00..=0xFE9F => Route::Oam,
        0xFEA0..=0xFEFF => Route::Unusable,
        0xFF00..=0xFF7F => Route::Io,
        0xFF80..=0xFFFE => Route::Hram,
        0xFFFF => Route::InterruptEnable,
    }
}

pub struct Bus {
    pub mbc: Mbc,
    routes: Vec<Route>,
    hooks: Vec<Box<dyn MemoryHandler>>,
}

impl Bus {
    pub fn new(mbc: Mbc) -> Bus {
        Bus {
            mbc,
            routes: (0..=0xFFFF).map(static_route).collect(),
            hooks: Vec::new(),
        }
    }

    /// Installs a handler that takes over all reads and writes to a single address.
    pub fn replace_memory(&mut self, addr: u16, handler: Box<dyn MemoryHandler>) {
        self.hooks.push(handler);
        self.routes[usize::from(addr)] = Route::Hook(self.hooks.len() - 1);
    }

    /// Called by the display component when it starts/stops reading from video RAM.
    pub fn set_vram_accessible(&mut self, hw: &mut HardwareState, accessible: bool) {
        hw.vram_accessible = accessible;
        self.set_region(0x8000..=0x9FFF, Route::Vram, accessible);
    }

    /// Called by the display component when it starts/stops reading from sprite attribute memory.
    pub fn set_oam_accessible(&mut self, hw: &mut HardwareState, accessible: bool) {
        hw.oam_accessible = accessible;
        self.set_region(0xFE00..=0xFE9F, Route::Oam, accessible);
    }

    /// Brings the routing table back in line with the visibility flags in `hw`, e.g after restoring a save state.
    pub fn sync(&mut self, hw: &HardwareState) {
        self.set_region(0x8000..=0x9FFF, Route::Vram, hw.vram_accessible);
        self.set_region(0xFE00..=0xFE9F, Route::Oam, hw.oam_accessible);
    }

    fn set_region(&mut self, range: std::ops::RangeInclusive<usize>, route: Route, visible: bool) {
        for entry in &mut self.routes[range] {
            // Installed handlers win over visibility changes.
            if let Route::Hook(_) = entry {
                continue;
            }
            *entry = if visible { route } else { Route::Blocked };
        }
    }

    pub fn read(&mut self, hw: &HardwareState, addr: u16) -> u8 {
        let route = self.routes[usize::from(addr)];
        self.read_route(hw, addr, route)
    }

    /// Reads on behalf of a DMA engine. DMA sees memory as it's wired, regardless of what the display has locked.
    pub fn dma_read(&mut self, hw: &HardwareState, addr: u16) -> u8 {
        self.read_route(hw, addr, static_route(addr))
    }

    fn read_route(&mut self, hw: &HardwareState, addr: u16, route: Route) -> u8 {
        match route {
            Route::Rom => self.mbc.read_rom(hw, addr),
            Route::Vram => hw.vram[hw.vram_bank_offset() + usize::from(addr - 0x8000)],
            Route::CartRam => self.mbc.read_ram(hw, addr - 0xA000),
            Route::Wram0 => hw.wram[usize::from(addr & 0x0FFF)],
            Route::WramN => hw.wram[hw.wram_bank_offset() + usize::from(addr & 0x0FFF)],
            // OAM is unreadable while a DMA transfer is writing to it.
            Route::Oam if hw.dma.active => 0xFF,
            Route::Oam => hw.oam[usize::from(addr - 0xFE00)],
            Route::Unusable | Route::Blocked => 0xFF,
            Route::Io => io_read(hw, addr),
            Route::Hram => hw.hram[usize::from(addr - 0xFF80)],
            Route::InterruptEnable => hw.ie,
            Route::Hook(idx) => self.hooks[idx].read(hw, addr),
        }
    }

    pub fn write(&mut self, hw: &mut HardwareState, addr: u16, v: u8) {
        let route = self.routes[usize::from(addr)];
        match route {
            Route::Rom => self.mbc.write_rom(hw, addr, v),
            Route::Vram => {
                let idx = hw.vram_bank_offset() + usize::from(addr - 0x8000);
                hw.vram[idx] = v;
            }
            Route::CartRam => self.mbc.write_ram(hw, addr - 0xA000, v),
            Route::Wram0 => hw.wram[usize::from(addr & 0x0FFF)] = v,
            Route::WramN => {
                let idx = hw.wram_bank_offset() + usize::from(addr & 0x0FFF);
                hw.wram[idx] = v;
            }
            Route::Oam if hw.dma.active => {}
            Route::Oam => hw.oam[usize::from(addr - 0xFE00)] = v,
            Route::Unusable | Route::Blocked => {}
            Route::Io => self.io_write(hw, addr, v),
            Route::Hram => hw.hram[usize::from(addr - 0xFF80)] = v,
            Route::InterruptEnable => hw.ie = v,
            Route::Hook(idx) => self.hooks[idx].write(hw, addr, v),
        }
    }

    fn io_write(&mut self, hw: &mut HardwareState, addr: u16, v: u8) {
        let cgb = hw.cgb();
        match addr {
            0xFF04 => Timer::reg_div_write(hw),
            0xFF05 => Timer::reg_tima_write(hw, v),
            0xFF06 => Timer::reg_tma_write(hw, v),
            0xFF07 => Timer::reg_tac_write(hw, v),
            0xFF0F => hw.io[0x0F] = v & 0x1F,
            0xFF46 => DmaController::start(hw, v),
            0xFF4D if cgb => hw.io[0x4D] = v & 1,
            0xFF4F if cgb => hw.io[0x4F] = v & 1,
            0xFF51..=0xFF54 if cgb => DmaController::reg_hdma_write(hw, addr, v),
            0xFF55 if cgb => DmaController::reg_hdma5_write(hw, self, v),
            0xFF70 if cgb => hw.io[0x70] = v & 0b111,
            _ => hw.io[usize::from(addr & 0x7F)] = v,
        }
    }
}

fn io_read(hw: &HardwareState, addr: u16) -> u8 {
    let cgb = hw.cgb();
    match addr {
        0xFF04 => Timer::reg_div_read(hw),
        0xFF05 => hw.timer.tima,
        0xFF06 => hw.timer.tma,
        0xFF07 => Timer::reg_tac_read(hw),
        0xFF0F => 0xE0 | hw.io[0x0F],
        0xFF46 => hw.dma.reg,
        0xFF4D if cgb => (if hw.double_speed { 0x80 } else { 0 }) | 0x7E | hw.io[0x4D],
        0xFF4F if cgb => 0xFE | hw.io[0x4F],
        0xFF51..=0xFF54 if cgb => 0xFF,
        0xFF55 if cgb => DmaController::reg_hdma5_read(hw),
        0xFF70 if cgb => 0xF8 | hw.io[0x70],
        _ => hw.io[usize::from(addr & 0x7F)],
    }
}
