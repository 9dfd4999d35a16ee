//! Error types for the core. Problems with a cartridge image are detected once, at load time, before an emulation
//! session exists. Once a session is running, bus accesses can't fail; the only run-time failures are the fatal
//! conditions in `Fault`, which stop the scheduler.

use thiserror::Error;

/// Reasons a cartridge image can be rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("ROM is only {0} bytes, too short to contain a cartridge header")]
    HeaderTooShort(usize),
    #[error("unsupported cartridge type ${0:02x}")]
    UnsupportedCartridgeType(u8),
    #[error("unsupported ROM size code ${0:02x}")]
    InvalidRomSize(u8),
    #[error("unsupported RAM size code ${0:02x}")]
    InvalidRamSize(u8),
    #[error("ROM header declares {expected} bytes but image is {actual} bytes")]
    TruncatedRom { expected: usize, actual: usize },
}

/// Reasons a save-state blob can be rejected.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("not a save state (bad magic)")]
    BadMagic,
    #[error("unsupported save state version {0}")]
    UnsupportedVersion(u16),
    #[error("save state is truncated")]
    Truncated,
    #[error("save state was taken with a different cartridge")]
    RomMismatch,
    #[error("save state is inconsistent: {0}")]
    Inconsistent(&'static str),
    #[error("save state payload is corrupt: {0}")]
    Decode(#[from] bincode::Error),
}

/// Fatal conditions hit while the machine is running.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Fault {
    #[error("MBC3 RAM/RTC select ${0:02x} is out of range")]
    InvalidRamSelect(u8),
    #[error("illegal opcode ${opcode:02x} at ${pc:04x}, CPU locked up")]
    IllegalOpcode { opcode: u8, pc: u16 },
}
