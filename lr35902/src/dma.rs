//! DMA transfers are a faster way to copy data around than doing it manually with LD commands.
//!
//! OAM DMA copies 160 bytes into the sprite attribute table, one byte every 4 clock ticks. The CPU keeps running
//! while it happens, but OAM itself reads as 0xFF until the copy is done.
//!
//! The Color model adds a second engine that copies blocks of 16 bytes into video RAM. In general-purpose mode the
//! whole transfer happens at once and the CPU is stalled for it. In h-blank mode one block is copied each time the
//! display enters horizontal blank.

use crate::bus::Bus;
use crate::hardware::HardwareState;
use log::trace;

const OAM_DMA_BYTES: u8 = 160;
const OAM_DMA_TICKS_PER_BYTE: u16 = 4;
const HDMA_BLOCK_SIZE: u16 = 0x10;

pub struct DmaController;

/// Destinations are always inside VRAM and aligned to 16 bytes.
fn sanitize_dest(addr: u16) -> u16 {
    0x8000 | (addr & 0x1FF0)
}

impl DmaController {
    /// Write to the 0xFF46 DMA register. Starts (or restarts) an OAM transfer from `v << 8`.
    pub fn start(hw: &mut HardwareState, mut v: u8) {
        hw.dma.reg = v;

        // Source addresses higher or equal to 0xFE have 0x20 subtracted from them, because reasons.
        if v >= 0xFE {
            v -= 0x20;
        }

        hw.dma.source = u16::from(v) << 8;
        hw.dma.active = true;
        hw.dma.ticks = 0;
        hw.dma.bytes = 0;
        trace!("OAM DMA from {:#06x}", hw.dma.source);
    }

    /// Runs the OAM DMA procedure for a single CPU clock tick, when it's active.
    pub fn clock(hw: &mut HardwareState, bus: &mut Bus) {
        if !hw.dma.active {
            return;
        }

        hw.dma.ticks += 1;
        if hw.dma.ticks % OAM_DMA_TICKS_PER_BYTE != 0 {
            return;
        }

        let idx = hw.dma.bytes;
        let v = bus.dma_read(hw, hw.dma.source + u16::from(idx));
        hw.oam[usize::from(idx)] = v;
        hw.dma.bytes += 1;
        if hw.dma.bytes == OAM_DMA_BYTES {
            hw.dma.active = false;
        }
    }

    /// Writes to the 0xFF51 - 0xFF54 source/destination registers. They're latched only while no transfer runs.
    pub fn reg_hdma_write(hw: &mut HardwareState, addr: u16, v: u8) {
        let hdma = &mut hw.hdma;
        if hdma.active {
            return;
        }

        match addr {
            0xFF51 => hdma.source = u16::from(v) << 8 | (hdma.source & 0x00FF),
            0xFF52 => hdma.source = (hdma.source & 0xFF00) | u16::from(v & 0xF0),
            0xFF53 => hdma.dest = sanitize_dest(u16::from(v) << 8 | (hdma.dest & 0x00F0)),
            _ => hdma.dest = sanitize_dest((hdma.dest & 0x1F00) | u16::from(v & 0xF0)),
        }
    }

    /// Read from the 0xFF55 HDMA5 register.
    pub fn reg_hdma5_read(hw: &HardwareState) -> u8 {
        if hw.hdma.active {
            hw.hdma.blocks.wrapping_sub(1) & 0x7F
        } else {
            0xFF
        }
    }

    /// Write to the 0xFF55 HDMA5 register. Bit 7 picks h-blank mode, the low 7 bits are the block count minus one.
    pub fn reg_hdma5_write(hw: &mut HardwareState, bus: &mut Bus, v: u8) {
        if hw.hdma.active && v & 0x80 == 0 {
            // Clearing bit 7 during an h-blank transfer aborts it.
            trace!("HDMA cancelled with {} blocks left", hw.hdma.blocks);
            hw.hdma.active = false;
            return;
        }

        let blocks = (v & 0x7F) + 1;
        hw.hdma.blocks = blocks;

        if v & 0x80 == 0 {
            trace!(
                "GDMA {:#06x} -> {:#06x}, {} blocks",
                hw.hdma.source,
                hw.hdma.dest,
                blocks
            );
            for _ in 0..blocks {
                DmaController::copy_block(hw, bus);
            }
            hw.hdma.blocks = 0;
        } else {
            trace!(
                "HDMA {:#06x} -> {:#06x}, {} blocks",
                hw.hdma.source,
                hw.hdma.dest,
                blocks
            );
            hw.hdma.hblank = true;
            hw.hdma.active = true;
        }
    }

    /// Called by the display component each time it enters horizontal blank.
    pub fn hblank(hw: &mut HardwareState, bus: &mut Bus) {
        if !hw.hdma.active {
            return;
        }

        DmaController::copy_block(hw, bus);
        hw.hdma.blocks -= 1;
        if hw.hdma.blocks == 0 {
            hw.hdma.active = false;
        }
    }

    /// Copies one 16-byte block into VRAM and charges the CPU for it.
    fn copy_block(hw: &mut HardwareState, bus: &mut Bus) {
        let vram_offset = hw.vram_bank_offset();
        for i in 0..HDMA_BLOCK_SIZE {
            let v = bus.dma_read(hw, hw.hdma.source.wrapping_add(i));
            hw.vram[vram_offset + usize::from((hw.hdma.dest + i) & 0x1FFF)] = v;
        }
        hw.hdma.source = hw.hdma.source.wrapping_add(HDMA_BLOCK_SIZE);
        hw.hdma.dest = sanitize_dest(hw.hdma.dest.wrapping_add(HDMA_BLOCK_SIZE));

        // The transfer runs at the same real-time speed regardless of CPU speed.
        hw.hdma_stall += if hw.double_speed { 16 } else { 8 };
    }
}
