//! Save states. Since `HardwareState` is the only place mutable emulation state lives, a save state is just that struct
//! run through bincode, behind a small header:
//!
//! ```text
//! 0..4   "LR35"
//! 4..6   format version, u16 LE
//! 6..10  payload length, u32 LE
//! 10..   bincode payload
//! ```
//!
//! Cartridge ROM is never included. The payload carries a fingerprint of the ROM instead, and restoring into a session
//! running a different cartridge is refused.

use crate::error::StateError;
use crate::hardware::{HardwareState, Model};
use crate::rom::ROM_BANK_SIZE;
use byteorder::{ByteOrder, LittleEndian};

pub const MAGIC: &[u8; 4] = b"LR35";
pub const VERSION: u16 = 1;

const HEADER_LEN: usize = 10;

/// Serializes `hw` into `out`.
pub fn save_state(hw: &HardwareState, out: &mut Vec<u8>) -> Result<(), StateError> {
    let payload = bincode::serialize(hw)?;

    let mut header = [0; HEADER_LEN];
    header[..4].copy_from_slice(MAGIC);
    LittleEndian::write_u16(&mut header[4..6], VERSION);
    LittleEndian::write_u32(&mut header[6..], payload.len() as u32);

    out.reserve(HEADER_LEN + payload.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&payload);
    Ok(())
}

/// Replaces `hw` with the state stored in `data`. On error `hw` is left untouched.
pub fn load_state(hw: &mut HardwareState, data: &[u8]) -> Result<(), StateError> {
    if data.len() >= MAGIC.len() && &data[..MAGIC.len()] != MAGIC {
        return Err(StateError::BadMagic);
    }
    if data.len() < HEADER_LEN {
        return Err(StateError::Truncated);
    }

    let version = LittleEndian::read_u16(&data[4..6]);
    if version != VERSION {
        return Err(StateError::UnsupportedVersion(version));
    }

    let len = LittleEndian::read_u32(&data[6..HEADER_LEN]) as usize;
    let payload = data.get(HEADER_LEN..HEADER_LEN + len).ok_or(StateError::Truncated)?;

    let mut state: HardwareState = bincode::deserialize(payload)?;
    if state.identity != hw.identity {
        return Err(StateError::RomMismatch);
    }
    check_consistency(&state, hw)?;

    state.rom = std::mem::take(&mut hw.rom);
    *hw = state;
    Ok(())
}

/// The bus indexes memory regions with the offsets and lengths stored in the state. A blob that decodes fine but breaks
/// any of these would panic on a later access instead of failing here.
fn check_consistency(state: &HardwareState, current: &HardwareState) -> Result<(), StateError> {
    let (vram_len, wram_len) = match state.model {
        Model::Dmg => (0x2000, 0x2000),
        Model::Cgb => (0x4000, 0x8000),
    };
    if state.vram.len() != vram_len {
        return Err(StateError::Inconsistent("video RAM size doesn't match model"));
    }
    if state.wram.len() != wram_len {
        return Err(StateError::Inconsistent("work RAM size doesn't match model"));
    }
    if state.cart_ram.len() != current.cart_ram.len() {
        return Err(StateError::Inconsistent("cartridge RAM size doesn't match cartridge"));
    }

    let banks = &state.banks;
    let rom_len = current.rom.len();
    if banks.rom_bank0_offset + ROM_BANK_SIZE > rom_len || banks.rom_bank1_offset + ROM_BANK_SIZE > rom_len {
        return Err(StateError::Inconsistent("ROM bank offset out of range"));
    }
    if banks.ram_offset > 0 && banks.ram_offset >= state.cart_ram.len() {
        return Err(StateError::Inconsistent("RAM bank offset out of range"));
    }
    if banks.ram_select > 0x0C {
        return Err(StateError::Inconsistent("RAM/RTC select out of range"));
    }
    if state.dma.active && usize::from(state.dma.bytes) >= state.oam.len() {
        return Err(StateError::Inconsistent("OAM DMA progress out of range"));
    }
    Ok(())
}
