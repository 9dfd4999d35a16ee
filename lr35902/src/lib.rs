//! A cycle-accurate core for the Gameboy (DMG) and Gameboy Color (CGB): the LR35902 CPU interpreter, the memory bus,
//! cartridge bank controllers, interrupts, the timer and the DMA engines.
//!
//! The display and sound hardware aren't part of the core. They plug in through `Bus::replace_memory` for the
//! registers they own, raise interrupts via `InterruptController::request`, and drive `Bus::set_vram_accessible`,
//! `Bus::set_oam_accessible` and `DmaController::hblank` as they go.

pub mod bus;
pub mod cartridge;
pub mod cpu;
pub mod dma;
pub mod error;
pub mod hardware;
pub mod interrupt;
pub mod rom;
pub mod savestate;
pub mod timer;
pub mod util;

pub use error::{Fault, LoadError, StateError};
pub use hardware::Model;
pub use rom::Rom;

use bus::Bus;
use dma::DmaController;
use hardware::HardwareState;
use interrupt::InterruptController;
use log::{debug, warn};
use rom::CgbMode;
use timer::Timer;

/// Base clock ticks per second. This is the CPU clock in normal speed mode.
pub const CLOCK_SPEED: u64 = 4_194_304;
pub const NOOP_LISTENER: NoopListener = NoopListener {};

// The main entrypoint into the core. Represents an emulation session for a single cartridge.
pub struct Gameboy<T: EventListener> {
    pub hw: HardwareState,
    pub bus: Bus,
    listener: T,
}

/// Knobs for a new emulation session.
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    /// Forces the emulated model. When unset, CGB hardware is used if the cartridge header asks for it.
    pub model: Option<Model>,
}

/// This trait can be implemented to get notified when interesting things occur inside the emulator.
pub trait EventListener {
    /// Called after a tick that wrote to battery-backed cartridge RAM, with the full contents of that RAM.
    fn on_battery_write(&mut self, ram: &[u8]);
}

/// An empty EventListener. Use NOOP_LISTENER if you're not interested in anything that occurs inside the emulator.
pub struct NoopListener {}

impl EventListener for NoopListener {
    fn on_battery_write(&mut self, _: &[u8]) {}
}

impl<T: EventListener> Gameboy<T> {
    pub fn new(rom: Rom, config: Config, listener: T) -> Gameboy<T> {
        let model = config.model.unwrap_or(match rom.cgb_mode {
            CgbMode::None => Model::Dmg,
            CgbMode::BackwardsCompatible | CgbMode::CgbOnly => Model::Cgb,
        });
        debug!("Starting session for \"{}\" as {:?}", rom.title, model);

        Gameboy {
            bus: Bus::new(rom.mbc),
            hw: HardwareState::new(rom, model),
            listener,
        }
    }

    /// Advances the machine by a single base clock tick. In double speed mode the CPU, timer and DMA get two ticks
    /// for each one of these.
    pub fn tick(&mut self) -> Result<(), Fault> {
        let hw = &mut self.hw;
        let bus = &mut self.bus;

        let cpu_ticks = if hw.double_speed { 2 } else { 1 };
        for _ in 0..cpu_ticks {
            // The order matters: an interrupt raised by the timer in this tick must be seen before the CPU decodes.
            Timer::clock(hw);
            DmaController::clock(hw, bus);
            InterruptController::clock(hw, bus);
            if hw.cycles_pending == 0 {
                let cycles = cpu::step(hw, bus);
                hw.cycles_pending = cycles + std::mem::take(&mut hw.hdma_stall);
            }
            hw.cycles_pending -= 1;
        }

        bus.mbc.clock(hw);
        hw.cycle_count += 1;

        if hw.battery_dirty {
            hw.battery_dirty = false;
            self.listener.on_battery_write(&hw.cart_ram);
        }

        match hw.fault.take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Runs the machine for the given number of base clock ticks.
    pub fn run_cycles(&mut self, ticks: u64) -> Result<(), Fault> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(())
    }

    /// Runs until the CPU is about to start on its next instruction. Useful for debuggers / tests. If an interrupt is
    /// dispatched instead, this runs through the dispatch.
    pub fn run_instruction(&mut self) -> Result<(), Fault> {
        self.tick()?;
        while self.hw.cycles_pending > 0 {
            self.tick()?;
        }
        Ok(())
    }

    /// Restores battery-backed cartridge RAM, e.g from a save file. Should be done before the first tick.
    pub fn load_battery_ram(&mut self, data: &[u8]) {
        let ram = &mut self.hw.cart_ram;
        if data.len() != ram.len() {
            warn!(
                "Battery RAM is {} bytes, cartridge has {}. Loading what fits",
                data.len(),
                ram.len()
            );
        }
        let len = data.len().min(ram.len());
        ram[..len].copy_from_slice(&data[..len]);
    }

    pub fn save_state(&self) -> Result<Vec<u8>, StateError> {
        let mut out = Vec::new();
        savestate::save_state(&self.hw, &mut out)?;
        debug!("Saved state, {} bytes", out.len());
        Ok(out)
    }

    pub fn load_state(&mut self, data: &[u8]) -> Result<(), StateError> {
        savestate::load_state(&mut self.hw, data)?;
        self.bus.sync(&self.hw);
        debug!("Loaded state at cycle {}", self.hw.cycle_count);
        Ok(())
    }

    /// Decodes `count` instructions starting at PC, without executing anything.
    pub fn disassemble(&mut self, count: usize) -> Vec<(u16, cpu::Instruction)> {
        let mut addr = self.hw.cpu.pc;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let mut fetch_addr = addr;
            let hw = &self.hw;
            let bus = &mut self.bus;
            let instruction = cpu::decode_instruction(|| {
                let v = bus.read(hw, fetch_addr);
                fetch_addr = fetch_addr.wrapping_add(1);
                v
            });
            out.push((addr, instruction));
            addr = addr.wrapping_add(u16::from(instruction.size()));
        }
        out
    }
}
