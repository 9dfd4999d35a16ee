mod common;

use common::*;
use lr35902::savestate::{MAGIC, VERSION};
use lr35902::{Config, Gameboy, StateError, NOOP_LISTENER};

// LD HL,$C000; loop: INC (HL); INC L; JR loop
const COUNTER: &[u8] = &[0x21, 0x00, 0xC0, 0x34, 0x2C, 0x18, 0xFC];

#[test]
fn header_layout() {
    let gb = gameboy(COUNTER);
    let state = gb.save_state().unwrap();
    assert_eq!(&state[..4], MAGIC);
    assert_eq!(state[4..6], VERSION.to_le_bytes());
    let len = u32::from_le_bytes([state[6], state[7], state[8], state[9]]) as usize;
    assert_eq!(state.len(), 10 + len);
}

#[test]
fn restore_is_exact_and_deterministic() {
    let mut gb = gameboy(COUNTER);
    gb.run_cycles(1000).unwrap();
    let checkpoint = gb.save_state().unwrap();
    assert_eq!(gb.save_state().unwrap(), checkpoint);

    gb.run_cycles(5000).unwrap();
    let later = gb.save_state().unwrap();
    assert_ne!(later, checkpoint);

    gb.load_state(&checkpoint).unwrap();
    assert_eq!(gb.save_state().unwrap(), checkpoint);
    assert_eq!(gb.hw.cycle_count, 1000);

    gb.run_cycles(5000).unwrap();
    assert_eq!(gb.save_state().unwrap(), later);
}

#[test]
fn restore_into_new_session() {
    let mut gb = gameboy(COUNTER);
    gb.run_cycles(2000).unwrap();
    let state = gb.save_state().unwrap();

    let mut fresh = gameboy(COUNTER);
    fresh.load_state(&state).unwrap();
    assert_eq!(fresh.save_state().unwrap(), state);
    assert_eq!(fresh.peek(0xC000), gb.peek(0xC000));
    // ROM isn't part of the state, the session keeps its own.
    assert_eq!(fresh.peek(0x0100), 0x21);
}

#[test]
fn bad_magic() {
    let mut gb = gameboy(COUNTER);
    let mut state = gb.save_state().unwrap();
    state[0] = b'X';
    assert!(matches!(gb.load_state(&state), Err(StateError::BadMagic)));
}

#[test]
fn truncated() {
    let mut gb = gameboy(COUNTER);
    let state = gb.save_state().unwrap();
    assert!(matches!(gb.load_state(&state[..3]), Err(StateError::Truncated)));
    assert!(matches!(gb.load_state(&state[..8]), Err(StateError::Truncated)));
    assert!(matches!(
        gb.load_state(&state[..state.len() - 1]),
        Err(StateError::Truncated)
    ));
}

#[test]
fn unsupported_version() {
    let mut gb = gameboy(COUNTER);
    let mut state = gb.save_state().unwrap();
    state[4] = 2;
    assert!(matches!(gb.load_state(&state), Err(StateError::UnsupportedVersion(2))));
}

#[test]
fn corrupt_payload() {
    let mut gb = gameboy(COUNTER);
    let mut state = MAGIC.to_vec();
    state.extend_from_slice(&VERSION.to_le_bytes());
    state.extend_from_slice(&3u32.to_le_bytes());
    state.extend_from_slice(&[0xFF; 3]);
    assert!(matches!(gb.load_state(&state), Err(StateError::Decode(_))));
}

#[test]
fn different_cartridge_is_refused() {
    let mut gb = gameboy(COUNTER);
    gb.run_cycles(100).unwrap();
    let state = gb.save_state().unwrap();

    let mut rom = build_rom(0x00, 0, 0, COUNTER);
    rom[0x134..0x138].copy_from_slice(b"OTHR");
    let mut other = Gameboy::new(load(rom), Config::default(), NOOP_LISTENER);
    assert!(matches!(other.load_state(&state), Err(StateError::RomMismatch)));
    // A failed restore leaves the session as it was.
    assert_eq!(other.hw.cycle_count, 0);
    assert_eq!(other.hw.cpu.pc, 0x100);
}

#[test]
fn memory_visibility_is_restored() {
    let mut gb = gameboy(COUNTER);
    gb.poke(0x8000, 0x42);
    gb.bus.set_vram_accessible(&mut gb.hw, false);
    let state = gb.save_state().unwrap();

    gb.bus.set_vram_accessible(&mut gb.hw, true);
    assert_eq!(gb.peek(0x8000), 0x42);

    gb.load_state(&state).unwrap();
    assert!(!gb.hw.vram_accessible);
    assert_eq!(gb.peek(0x8000), 0xFF);
}

#[test]
fn cgb_state_round_trip() {
    let mut gb = cgb_gameboy(COUNTER);
    gb.poke(0xFF70, 0x05);
    gb.poke(0xD000, 0x77);
    gb.hw.double_speed = true;
    gb.run_cycles(500).unwrap();
    let state = gb.save_state().unwrap();

    let mut fresh = cgb_gameboy(COUNTER);
    fresh.load_state(&state).unwrap();
    assert!(fresh.hw.double_speed);
    assert_eq!(fresh.peek(0xD000), 0x77);
    assert_eq!(fresh.save_state().unwrap(), state);
}

#[test]
fn inconsistent_state_is_refused() {
    let mut fresh = gameboy(COUNTER);

    let mut donor = gameboy(COUNTER);
    donor.hw.vram = vec![0; 0x10];
    let state = donor.save_state().unwrap();
    assert!(matches!(fresh.load_state(&state), Err(StateError::Inconsistent(_))));

    let mut donor = gameboy(COUNTER);
    donor.hw.wram.truncate(0x1000);
    let state = donor.save_state().unwrap();
    assert!(matches!(fresh.load_state(&state), Err(StateError::Inconsistent(_))));

    // Bank 2 doesn't exist on a 32KiB cartridge.
    let mut donor = gameboy(COUNTER);
    donor.hw.banks.rom_bank1_offset = 0x8000;
    let state = donor.save_state().unwrap();
    assert!(matches!(fresh.load_state(&state), Err(StateError::Inconsistent(_))));

    // The session is untouched and still runs.
    assert_eq!(fresh.hw.cycle_count, 0);
    assert_eq!(fresh.hw.vram.len(), 0x2000);
    assert_eq!(fresh.peek(0x9FFF), 0x00);
    fresh.run_cycles(100).unwrap();
    assert_eq!(fresh.peek(0x4000), 0x01);
}

#[test]
fn cartridge_ram_size_mismatch_is_refused() {
    // MBC1+RAM+BATTERY with 8KiB of RAM.
    let mut donor = gameboy_with_cart(0x03, 0, 2, COUNTER);
    donor.hw.cart_ram.truncate(0x100);
    let state = donor.save_state().unwrap();

    let mut fresh = gameboy_with_cart(0x03, 0, 2, COUNTER);
    assert!(matches!(fresh.load_state(&state), Err(StateError::Inconsistent(_))));
    assert_eq!(fresh.hw.cart_ram.len(), 0x2000);
}
