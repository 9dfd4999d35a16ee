//! Gameboy interrupt controller.
//! Interrupts on the Gameboy are pretty straightforward. There's only a small handful of events that can trigger
//! interrupts: serial port activity, events in the display (VBlank, LCD status), Joypad input, and Timer overflows.
//! Between instructions the controller checks for any requested interrupt that's also enabled. If there is one, and
//! interrupts are enabled (IME), the CPU stops executing where it was up to, pushes the current PC register value onto
//! the stack, and jumps to a fixed location in memory, depending on which interrupt was processed.
//!
//! The request flags live in the IF register (0xFF0F) and the enable mask in IE (0xFFFF), both inside
//! `HardwareState`, so other components can raise an interrupt just by setting a bit.

use crate::bus::Bus;
use crate::hardware::HardwareState;
use crate::util::split16;

/// Clock ticks it takes to push PC and jump to a handler.
const DISPATCH_CYCLES: u32 = 20;

pub struct InterruptController;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 0b0_0001,
    Stat = 0b0_0010,
    Timer = 0b0_0100,
    Serial = 0b0_1000,
    Joypad = 0b1_0000,
}
use Interrupt::*;

impl Interrupt {
    /// Determines the appropriate memory location to jump to when processing an interrupt.
    pub fn handler_addr(self) -> u16 {
        match self {
            VBlank => 0x40,
            Stat => 0x48,
            Timer => 0x50,
            Serial => 0x58,
            Joypad => 0x60,
        }
    }
}

impl InterruptController {
    /// Request an interrupt.
    pub fn request(hw: &mut HardwareState, intr: Interrupt) {
        hw.io[0x0F] |= intr as u8;
    }

    /// Clear an interrupt request.
    pub fn clear(hw: &mut HardwareState, intr: Interrupt) {
        hw.io[0x0F] &= !(intr as u8);
    }

    /// Returns the highest priority interrupt that is both requested and enabled, if there is one.
    pub fn next_interrupt(hw: &HardwareState) -> Option<Interrupt> {
        // Interrupts follow a priority order, in case there's multiple pending requested interrupts.
        let pending = hw.ie & hw.io[0x0F] & 0x1F;
        [VBlank, Stat, Timer, Serial, Joypad]
            .iter()
            .copied()
            .find(|intr| pending & (*intr as u8) > 0)
    }

    /// Runs once per CPU clock tick, before the interpreter. Interrupts are only looked at on instruction boundaries,
    /// i.e when the CPU has no cycles of a previous instruction left to burn.
    pub fn clock(hw: &mut HardwareState, bus: &mut Bus) {
        if hw.cycles_pending > 0 {
            return;
        }

        let interrupt = match InterruptController::next_interrupt(hw) {
            Some(intr) => intr,
            None => return,
        };

        // If there are interrupts to process, we clear HALT state, even if IME is disabled.
        hw.cpu.halted = false;

        if !hw.cpu.ime {
            return;
        }

        let (hi, lo) = split16(hw.cpu.pc);
        let sp = hw.cpu.sp;
        bus.write(hw, sp.wrapping_sub(1), hi);
        bus.write(hw, sp.wrapping_sub(2), lo);
        hw.cpu.sp = sp.wrapping_sub(2);

        InterruptController::clear(hw, interrupt);
        hw.cpu.ime = false;
        hw.cpu.pc = interrupt.handler_addr();
        hw.cycles_pending = DISPATCH_CYCLES;
    }
}
