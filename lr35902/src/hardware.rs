//! The complete mutable state of an emulated machine. Every component of the core (bus, cartridge controller, timer,
//! DMA, interrupts, CPU) is stateless between clock ticks: they all operate on a `HardwareState` that's passed to them
//! by reference. That makes a save state nothing more than a serialized copy of this struct.

use crate::cartridge::Mbc;
use crate::error::Fault;
use crate::memory_segment;
use crate::rom::{Rom, RomIdentity, RAM_BANK_SIZE, ROM_BANK_SIZE};
use serde::{Deserialize, Serialize};

/// There are two generations of hardware this core emulates. The Color model has more video/work RAM (switched in
/// banks), a block-transfer DMA engine into video RAM, and a double-speed mode. Otherwise the CPU is identical.
#[derive(Clone, Copy, Debug, Eq, Deserialize, PartialEq, Serialize)]
pub enum Model {
    Dmg,
    Cgb,
}

memory_segment! { Oam; 0xA0 }
memory_segment! { Io; 0x80 }
memory_segment! { HRam; 0x7F }

#[derive(Deserialize, Serialize)]
pub struct HardwareState {
    pub model: Model,
    pub identity: RomIdentity,
    pub cpu: CpuState,

    #[serde(skip)]
    pub rom: Box<[u8]>, // 0x0000 - 0x7FFF, banked. Never part of a save state.
    pub rom_banks: usize,
    #[serde(with = "serde_bytes")]
    pub cart_ram: Vec<u8>, // 0xA000 - 0xBFFF, banked.
    pub has_battery: bool,
    pub has_rtc: bool,
    #[serde(with = "serde_bytes")]
    pub vram: Vec<u8>, // 0x8000 - 0x9FFF, 2 banks on CGB.
    #[serde(with = "serde_bytes")]
    pub wram: Vec<u8>, // 0xC000 - 0xDFFF (and echoed in 0xE000 - 0xFDFF), 8 banks on CGB.
    pub oam: Oam,   // 0xFE00 - 0xFE9F
    pub io: Io,     // 0xFF00 - 0xFF7F
    pub hram: HRam, // 0xFF80 - 0xFFFE
    pub ie: u8,     // 0xFFFF

    pub banks: BankState,
    pub rtc: RtcState,
    pub timer: TimerState,
    pub dma: DmaState,
    pub hdma: HdmaState,

    pub double_speed: bool,
    pub vram_accessible: bool, // Cleared by the display component while it's reading VRAM.
    pub oam_accessible: bool,  // Cleared by the display component while it's reading OAM.

    pub cycles_pending: u32, // Clock ticks left before the CPU fetches its next instruction.
    pub hdma_stall: u32,     // Clock ticks a general-purpose VRAM transfer has stolen from the CPU.
    pub cycle_count: u64,    // Total number of base clock ticks since the session began.

    pub battery_dirty: bool, // Battery-backed RAM was written during the current tick.
    #[serde(skip)]
    pub fault: Option<Fault>,
}

/// CPU registers and execution-mode flags.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CpuState {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: Flags,
    pub h: u8,
    pub l: u8,
    pub pc: u16,
    pub sp: u16,

    pub ime: bool,
    pub ime_pending: bool, // EI takes effect only after the instruction following it.
    pub halted: bool,
}

/// CPU flags contained in the "F" register:
/// Z: Zero flag, N: subtract flag, H: half carry flag, C: carry flag
/// The low nibble of F doesn't exist in hardware and always reads as zero.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Flags {
    pub z: bool, // Bit 7
    pub n: bool, // Bit 6
    pub h: bool, // Bit 5
    pub c: bool, // Bit 4
}

/// Bank-select latches written by the cartridge's memory bank controller, plus the offsets they resolve to. The
/// offsets are byte indices into `rom` / `cart_ram` and are always kept in range.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BankState {
    pub rom_bank0_offset: usize, // What's visible at 0x0000 - 0x3FFF
    pub rom_bank1_offset: usize, // What's visible at 0x4000 - 0x7FFF
    pub ram_offset: usize,       // What's visible at 0xA000 - 0xBFFF
    pub rom_select_lo: u8,
    pub rom_select_hi: u8,
    pub ram_select: u8,
    pub mode: bool,
    pub ram_enabled: bool,
}

/// The MBC3 real-time clock. Counts emulated time, not host time.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RtcState {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day_lo: u8,
    pub day_hi: u8, // Bit 0: day counter bit 8. Bit 6: halt. Bit 7: day counter carry.
    pub latched: [u8; 5],
    pub latch_armed: bool,
    pub subsecond: u32,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TimerState {
    pub div: u16, // Increments every clock tick. Only the top 8 bits are visible to the CPU.
    pub tima: u8,
    pub tma: u8,
    pub tac: u8,
    pub reload_delay: u8, // Ticks left until an overflowed TIMA is reloaded from TMA.
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DmaState {
    pub reg: u8,
    pub active: bool,
    pub source: u16,
    pub ticks: u16,
    pub bytes: u8,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct HdmaState {
    pub source: u16,
    pub dest: u16,
    pub blocks: u8, // Remaining 16-byte blocks of an h-blank transfer.
    pub hblank: bool,
    pub active: bool,
}

/// The 8-bit CPU registers. F is not included because no instruction references it directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[rustfmt::skip]
pub enum Register { A, B, C, D, E, H, L }

/// The 16-bit CPU registers. Apart from SP, these are pairs of the 8-bit registers viewed as 16 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[rustfmt::skip]
pub enum Register16 { AF, BC, DE, HL, SP }

impl HardwareState {
    /// Powers on a machine with the given cartridge inserted. The state matches what the boot program leaves behind
    /// when it hands control to the cartridge at 0x0100.
    pub fn new(rom: Rom, model: Model) -> HardwareState {
        let cgb = model == Model::Cgb;
        let identity = rom.identity();
        // Cartridges without a bank controller have no RAM enable register, their RAM (if any) is always mapped.
        let ram_always_enabled = rom.mbc == Mbc::NoMbc;

        let mut hw = HardwareState {
            model,
            identity,
            cpu: CpuState::default(),
            rom_banks: rom.rom_banks,
            cart_ram: vec![0; rom.ram_size],
            has_battery: rom.has_battery,
            has_rtc: rom.has_rtc,
            rom: rom.data,
            vram: vec![0; if cgb { 0x4000 } else { 0x2000 }],
            wram: vec![0; if cgb { 0x8000 } else { 0x2000 }],
            oam: Default::default(),
            io: Default::default(),
            hram: Default::default(),
            ie: 0,
            banks: BankState {
                rom_bank1_offset: ROM_BANK_SIZE,
                rom_select_lo: 1,
                ram_enabled: ram_always_enabled,
                ..Default::default()
            },
            rtc: Default::default(),
            timer: Default::default(),
            dma: Default::default(),
            hdma: HdmaState {
                source: 0,
                dest: 0x8000,
                ..Default::default()
            },
            double_speed: false,
            vram_accessible: true,
            oam_accessible: true,
            cycles_pending: 0,
            hdma_stall: 0,
            cycle_count: 0,
            battery_dirty: false,
            fault: None,
        };
        hw.skip_bootrom();
        hw
    }

    /// Puts the CPU and I/O registers into the state the boot program leaves them in.
    fn skip_bootrom(&mut self) {
        let cpu = &mut self.cpu;
        cpu.pc = 0x100;
        cpu.sp = 0xFFFE;
        match self.model {
            Model::Dmg => {
                cpu.register16_set(Register16::AF, 0x01B0);
                cpu.register16_set(Register16::BC, 0x0013);
                cpu.register16_set(Register16::DE, 0x00D8);
                cpu.register16_set(Register16::HL, 0x014D);
            }
            Model::Cgb => {
                cpu.register16_set(Register16::AF, 0x1180);
                cpu.register16_set(Register16::BC, 0x0000);
                cpu.register16_set(Register16::DE, 0xFF56);
                cpu.register16_set(Register16::HL, 0x000D);
            }
        }

        self.timer.div = 0xABCC;
        self.io[0x00] = 0xCF; // JOYP, no buttons pressed
        self.io[0x0F] = 0x01; // IF, VBlank left requested by the boot program
        self.io[0x40] = 0x91; // LCDC: display + background on
        self.io[0x47] = 0xFC; // BGP
        if self.model == Model::Cgb {
            self.io[0x70] = 0x01;
        }
    }

    pub fn cgb(&self) -> bool {
        self.model == Model::Cgb
    }

    /// Byte offset into `vram` of the currently selected video RAM bank.
    pub fn vram_bank_offset(&self) -> usize {
        if self.cgb() {
            usize::from(self.io[0x4F] & 1) * 0x2000
        } else {
            0
        }
    }

    /// Byte offset into `wram` of the bank visible at 0xD000 - 0xDFFF.
    pub fn wram_bank_offset(&self) -> usize {
        if self.cgb() {
            usize::from((self.io[0x70] & 0b111).max(1)) * 0x1000
        } else {
            0x1000
        }
    }

    /// Number of switchable RAM banks on the cartridge. Smaller-than-a-bank RAM still counts as one bank.
    pub fn ram_banks(&self) -> usize {
        (self.cart_ram.len() + RAM_BANK_SIZE - 1) / RAM_BANK_SIZE
    }

    /// Records a fatal condition. Only the first fault is kept, it's what the scheduler will report.
    pub fn raise(&mut self, fault: Fault) {
        if self.fault.is_none() {
            self.fault = Some(fault);
        }
    }
}

impl CpuState {
    /// Returns the current value of an 8-bit CPU register.
    pub fn register_get(&self, r: Register) -> u8 {
        match r {
            Register::A => self.a,
            Register::B => self.b,
            Register::C => self.c,
            Register::D => self.d,
            Register::E => self.e,
            Register::H => self.h,
            Register::L => self.l,
        }
    }

    /// Sets a new value for an 8-bit CPU register.
    pub fn register_set(&mut self, r: Register, v: u8) {
        match r {
            Register::A => self.a = v,
            Register::B => self.b = v,
            Register::C => self.c = v,
            Register::D => self.d = v,
            Register::E => self.e = v,
            Register::H => self.h = v,
            Register::L => self.l = v,
        }
    }

    /// Returns the current value of a 16-bit CPU register.
    pub fn register16_get(&self, reg: Register16) -> u16 {
        let (hi, lo) = match reg {
            Register16::AF => (self.a, self.f.pack()),
            Register16::BC => (self.b, self.c),
            Register16::DE => (self.d, self.e),
            Register16::HL => (self.h, self.l),
            Register16::SP => return self.sp,
        };

        u16::from(hi) << 8 | u16::from(lo)
    }

    /// Sets a new value for a 16-bit CPU register.
    pub fn register16_set(&mut self, reg: Register16, v: u16) {
        let (hi, lo) = match reg {
            Register16::AF => {
                self.a = (v >> 8) as u8;
                self.f.unpack(v as u8);
                return;
            }
            Register16::BC => (&mut self.b, &mut self.c),
            Register16::DE => (&mut self.d, &mut self.e),
            Register16::HL => (&mut self.h, &mut self.l),
            Register16::SP => {
                self.sp = v;
                return;
            }
        };

        *hi = (v >> 8) as u8;
        *lo = (v & 0xFF) as u8;
    }
}

impl Flags {
    /// Converts the CPU flags into an 8bit value. Used by instructions that operate on F register.
    pub fn pack(&self) -> u8 {
        (if self.z { 0b1000_0000 } else { 0 })
            | if self.n { 0b0100_0000 } else { 0 }
            | if self.h { 0b0010_0000 } else { 0 }
            | if self.c { 0b0001_0000 } else { 0 }
    }

    /// Converts 8 bit value into CPU flags. The low nibble is discarded.
    pub fn unpack(&mut self, v: u8) {
        self.z = v & 0b1000_0000 > 0;
        self.n = v & 0b0100_0000 > 0;
        self.h = v & 0b0010_0000 > 0;
        self.c = v & 0b0001_0000 > 0;
    }

    /// Clears all CPU flags.
    pub fn reset(&mut self) {
        *self = Flags::default();
    }
}
