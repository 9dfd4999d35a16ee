//! Implementation of the timer unit in the Gameboy LR35902 chip.
//!
//! The hardware doesn't count TIMA periods directly. Instead, one bit of the free-running DIV counter (selected by TAC)
//! is ANDed with the timer enable bit, and TIMA increments whenever that signal goes from 1 to 0. Modelling it the
//! same way gets all the obscure behaviours for free: writing DIV or TAC can produce a falling edge too, and when it
//! does TIMA ticks early.
//! See http://gbdev.gg8.se/wiki/articles/Timer_Obscure_Behaviour

use crate::hardware::{HardwareState, TimerState};
use crate::interrupt::{Interrupt, InterruptController};

/// Clock ticks between TIMA overflowing and it being reloaded from TMA.
const RELOAD_DELAY: u8 = 4;

pub struct Timer;

/// The DIV bit that drives TIMA for each of the TAC frequency selections. Bit N falls every 2^(N+1) ticks.
fn tac_bit(tac: u8) -> u16 {
    match tac & 0b11 {
        0b00 => 1 << 9, // 4096Hz
        0b01 => 1 << 3, // 262144Hz
        0b10 => 1 << 5, // 65536Hz
        _ => 1 << 7,    // 16384Hz
    }
}

/// Current state of the signal that clocks TIMA.
fn signal(t: &TimerState) -> bool {
    t.tac & 0b100 != 0 && t.div & tac_bit(t.tac) != 0
}

fn increment(t: &mut TimerState) {
    t.tima = t.tima.wrapping_add(1);
    if t.tima == 0 {
        // When TIMA overflows, we don't actually reload it with TMA and request timer interrupt immediately.
        t.reload_delay = RELOAD_DELAY;
    }
}

impl Timer {
    /// Advances the timer by a single CPU clock tick.
    pub fn clock(hw: &mut HardwareState) {
        let t = &mut hw.timer;

        if t.reload_delay > 0 {
            t.reload_delay -= 1;
            if t.reload_delay == 0 {
                t.tima = t.tma;
                InterruptController::request(hw, Interrupt::Timer);
            }
        }

        let t = &mut hw.timer;
        let before = signal(t);
        t.div = t.div.wrapping_add(1);
        if before && !signal(t) {
            increment(t);
        }
    }

    /// Read from the 0xFF04 DIV register.
    pub fn reg_div_read(hw: &HardwareState) -> u8 {
        (hw.timer.div >> 8) as u8
    }

    /// Write to the 0xFF04 DIV register. Whatever is written, the whole counter goes back to zero.
    pub fn reg_div_write(hw: &mut HardwareState) {
        let t = &mut hw.timer;
        let before = signal(t);
        t.div = 0;
        if before {
            increment(t);
        }
    }

    /// Write to the 0xFF05 TIMA register.
    pub fn reg_tima_write(hw: &mut HardwareState, v: u8) {
        // Writing TIMA while a reload is pending cancels the reload and the interrupt.
        hw.timer.reload_delay = 0;
        hw.timer.tima = v;
    }

    /// Write to the 0xFF06 TMA register.
    pub fn reg_tma_write(hw: &mut HardwareState, v: u8) {
        hw.timer.tma = v;
    }

    /// Read from the 0xFF07 TAC register.
    pub fn reg_tac_read(hw: &HardwareState) -> u8 {
        0b1111_1000 | hw.timer.tac // Unused bits.
    }

    /// Write to the 0xFF07 TAC register. Disabling the timer, or switching to a frequency whose DIV bit is low, can
    /// glitch TIMA forward a step.
    pub fn reg_tac_write(hw: &mut HardwareState, v: u8) {
        let t = &mut hw.timer;
        let before = signal(t);
        t.tac = v & 0b111;
        if before && !signal(t) {
            increment(t);
        }
    }
}
