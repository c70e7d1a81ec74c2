//! Zone layout of the data file

use crate::config::Config;
use crate::error::{Result, StoreError};

/// A contiguous region of the data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    pub offset: u64,
    pub size: u64,
}

impl Zone {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Where each component lives on the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub superblock: Zone,
    pub superblock_copies: u8,
    pub superblock_slot_size: u64,

    pub journal: Zone,
    pub journal_slot_count: u64,
    pub journal_slot_size: u64,

    pub manifest: Zone,

    pub grid: Zone,
    pub block_size: u64,
    pub block_count: u64,
}

impl Layout {
    pub fn new(config: &Config) -> Self {
        let superblock = Zone {
            offset: 0,
            size: config.superblock_copies as u64 * config.superblock_slot_size,
        };
        let journal = Zone {
            offset: superblock.end(),
            size: config.journal_slot_count * config.journal_slot_size,
        };
        let manifest = Zone {
            offset: journal.end(),
            size: config.manifest_zone_size,
        };
        let grid = Zone {
            offset: manifest.end(),
            size: config.grid_block_count * config.block_size,
        };
        Self {
            superblock,
            superblock_copies: config.superblock_copies,
            superblock_slot_size: config.superblock_slot_size,
            journal,
            journal_slot_count: config.journal_slot_count,
            journal_slot_size: config.journal_slot_size,
            manifest,
            grid,
            block_size: config.block_size,
            block_count: config.grid_block_count,
        }
    }

    /// Total bytes the device must provide
    pub fn total_size(&self) -> u64 {
        self.grid.end()
    }

    pub fn superblock_slot_offset(&self, slot: u8) -> u64 {
        self.superblock.offset + slot as u64 * self.superblock_slot_size
    }

    pub fn journal_slot_offset(&self, op: u64) -> u64 {
        self.journal.offset + (op % self.journal_slot_count) * self.journal_slot_size
    }

    /// Bytes available to one manifest half
    pub fn manifest_half_size(&self) -> u64 {
        self.manifest.size / 2
    }

    pub fn manifest_half_offset(&self, half: u32) -> u64 {
        self.manifest.offset + (half as u64 % 2) * self.manifest_half_size()
    }

    /// Device offset of a 1-based grid block address
    pub fn block_offset(&self, address: u64) -> Result<u64> {
        if address == 0 || address > self.block_count {
            return Err(StoreError::Corruption(format!(
                "block address {} outside grid of {} blocks",
                address, self.block_count
            )));
        }
        Ok(self.grid.offset + (address - 1) * self.block_size)
    }
}
