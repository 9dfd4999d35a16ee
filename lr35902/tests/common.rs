#![allow(dead_code)]

use lr35902::{Config, EventListener, Gameboy, Model, NoopListener, Rom, NOOP_LISTENER};
use std::cell::RefCell;
use std::rc::Rc;

/// Loops forever at 0x100.
pub const SPIN: &[u8] = &[0x18, 0xFE];

/// Synthesizes a cartridge image with a valid header and `code` at the 0x100 entry point. The first two bytes of every
/// bank other than bank 0 hold the bank number (low byte, then high byte), so tests can tell which bank is mapped.
pub fn build_rom(cart_type: u8, rom_code: u8, ram_code: u8, code: &[u8]) -> Vec<u8> {
    let banks = match rom_code {
        0x52 => 72,
        0x53 => 80,
        0x54 => 96,
        v => 2usize << v,
    };
    let mut rom = vec![0; banks * 0x4000];
    for bank in 1..banks {
        rom[bank * 0x4000] = bank as u8;
        rom[bank * 0x4000 + 1] = (bank >> 8) as u8;
    }

    rom[0x100..0x100 + code.len()].copy_from_slice(code);
    rom[0x134..0x138].copy_from_slice(b"TEST");
    rom[0x147] = cart_type;
    rom[0x148] = rom_code;
    rom[0x149] = ram_code;
    rom[0x14E] = 0xBE;
    rom[0x14F] = 0xEF;
    rom
}

/// Same as `build_rom`, but flagged as a Color cartridge.
pub fn build_cgb_rom(cart_type: u8, rom_code: u8, ram_code: u8, code: &[u8]) -> Vec<u8> {
    let mut rom = build_rom(cart_type, rom_code, ram_code, code);
    rom[0x143] = 0x80;
    rom
}

pub fn load(rom: Vec<u8>) -> Rom {
    Rom::new(rom.into_boxed_slice()).unwrap()
}

/// A 32KiB cartridge without a bank controller, running `code` on DMG hardware.
pub fn gameboy(code: &[u8]) -> Gameboy<NoopListener> {
    Gameboy::new(load(build_rom(0x00, 0, 0, code)), Config::default(), NOOP_LISTENER)
}

/// A 32KiB cartridge without a bank controller, running `code` on CGB hardware.
pub fn cgb_gameboy(code: &[u8]) -> Gameboy<NoopListener> {
    Gameboy::new(
        load(build_cgb_rom(0x00, 0, 0, code)),
        Config {
            model: Some(Model::Cgb),
        },
        NOOP_LISTENER,
    )
}

pub fn gameboy_with_cart(cart_type: u8, rom_code: u8, ram_code: u8, code: &[u8]) -> Gameboy<NoopListener> {
    Gameboy::new(
        load(build_rom(cart_type, rom_code, ram_code, code)),
        Config::default(),
        NOOP_LISTENER,
    )
}

/// Keeps a copy of everything reported through `on_battery_write`.
#[derive(Clone, Default)]
pub struct BatteryRecorder {
    pub writes: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl EventListener for BatteryRecorder {
    fn on_battery_write(&mut self, ram: &[u8]) {
        self.writes.borrow_mut().push(ram.to_vec());
    }
}

impl<T: EventListener> GameboyExt for Gameboy<T> {
    fn peek(&mut self, addr: u16) -> u8 {
        self.bus.read(&self.hw, addr)
    }

    fn poke(&mut self, addr: u16, v: u8) {
        self.bus.write(&mut self.hw, addr, v);
    }
}

/// Shorthands for poking at memory from outside the CPU.
pub trait GameboyExt {
    fn peek(&mut self, addr: u16) -> u8;
    fn poke(&mut self, addr: u16, v: u8);
}
