//! Utilities for extracting metadata from cartridge ROM images. Everything needed to set up an emulation session is
//! described by a handful of header bytes at fixed offsets: which memory bank controller is on the cartridge, how many
//! ROM banks it carries, how much (if any) RAM, and whether that RAM is battery backed.

use crate::cartridge::Mbc;
use crate::error::LoadError;
use log::debug;
use serde::{Deserialize, Serialize};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

const HEADER_END: usize = 0x150;

pub struct Rom {
    pub data: Box<[u8]>,
    pub title: String,
    pub cgb_mode: CgbMode,
    pub mbc: Mbc,
    pub has_battery: bool,
    pub has_rtc: bool,
    pub rom_banks: usize,
    pub ram_size: usize,
    pub checksum: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CgbMode {
    None,
    BackwardsCompatible,
    CgbOnly,
}

impl Rom {
    pub fn new(data: Box<[u8]>) -> Result<Rom, LoadError> {
        if data.len() < HEADER_END {
            return Err(LoadError::HeaderTooShort(data.len()));
        }

        let cgb_mode = match data[0x143] {
            0x80 => CgbMode::BackwardsCompatible,
            0xC0 => CgbMode::CgbOnly,
            _ => CgbMode::None,
        };

        let mut title_range = 0x134..0x144;
        if cgb_mode != CgbMode::None {
            // CGB roms use the last byte of what used to be the title sequence to denote CGB mode.
            title_range.end -= 1;
        }

        let title = data[title_range]
            .split(|b| *b == 0)
            .next()
            .and_then(|v| std::str::from_utf8(v).ok())
            .unwrap_or("UNKNOWN")
            .to_string();

        let cart_type = data[0x147];
        let mbc = match cart_type {
            0x00 | 0x08 | 0x09 => Mbc::NoMbc,
            0x01..=0x03 => Mbc::Mbc1,
            0x05 | 0x06 => Mbc::Mbc2,
            0x0F..=0x13 => Mbc::Mbc3,
            0x19..=0x1E => Mbc::Mbc5,
            v => return Err(LoadError::UnsupportedCartridgeType(v)),
        };
        let has_battery = matches!(cart_type, 0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E);
        let has_rtc = matches!(cart_type, 0x0F | 0x10);

        let rom_banks = match data[0x148] {
            v @ 0..=8 => 2usize << v,
            0x52 => 72,
            0x53 => 80,
            0x54 => 96,
            v => return Err(LoadError::InvalidRomSize(v)),
        };

        let ram_size = match mbc {
            // MBC2 has 512 half-bytes of RAM built into the controller itself. The header field is meaningless.
            Mbc::Mbc2 => 0x200,
            _ => match data[0x149] {
                0 => 0,
                1 => 0x800,
                2 => RAM_BANK_SIZE,
                3 => RAM_BANK_SIZE * 4,
                4 => RAM_BANK_SIZE * 16,
                5 => RAM_BANK_SIZE * 8,
                v => return Err(LoadError::InvalidRamSize(v)),
            },
        };

        let expected = rom_banks * ROM_BANK_SIZE;
        if data.len() < expected {
            return Err(LoadError::TruncatedRom {
                expected,
                actual: data.len(),
            });
        }

        let checksum = u16::from(data[0x14E]) << 8 | u16::from(data[0x14F]);

        debug!(
            "Loaded cartridge \"{}\": {:?}, {} ROM banks, {} bytes RAM, battery={}, rtc={}",
            title, mbc, rom_banks, ram_size, has_battery, has_rtc
        );

        Ok(Rom {
            data,
            title,
            cgb_mode,
            mbc,
            has_battery,
            has_rtc,
            rom_banks,
            ram_size,
            checksum,
        })
    }

    /// A short fingerprint of the cartridge, used to make sure a save state is restored into the game it came from.
    pub fn identity(&self) -> RomIdentity {
        RomIdentity {
            title: self.title.clone(),
            checksum: self.checksum,
            rom_banks: self.rom_banks as u32,
        }
    }

    pub fn rom_bank(&self, bank: usize) -> &[u8] {
        let bank = bank % self.rom_banks;
        &self.data[bank * ROM_BANK_SIZE..(bank + 1) * ROM_BANK_SIZE]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RomIdentity {
    pub title: String,
    pub checksum: u16,
    pub rom_banks: u32,
}
