//! Manifest tests
//!
//! These tests verify:
//! - Log append, flush and replay within one half
//! - Torn tails and pointers that overshoot the valid log
//! - Half switching on log compaction
//! - Per-level table bookkeeping and lookups

mod levels_tests;

use ledgerstore::manifest::{ManifestEvent, TableInfo};
use ledgerstore::storage::{Layout, MemoryStorage};
use ledgerstore::Config;

// =============================================================================
// Helper Functions
// =============================================================================

pub fn layout() -> Layout {
    Config::builder()
        .superblock_slot_size(1024)
        .journal_slot_count(4)
        .journal_slot_size(256)
        .manifest_zone_size(8 * 1024)
        .block_size(512)
        .grid_block_count(64)
        .build()
        .layout()
}

pub fn device() -> (MemoryStorage, Layout) {
    let layout = layout();
    (MemoryStorage::new(layout.total_size()), layout)
}

/// A table covering keys `[min, max]`
pub fn table(id: u64, min: u8, max: u8) -> TableInfo {
    TableInfo {
        id,
        key_min: vec![min],
        key_max: vec![max],
        op_min: id,
        op_max: id + 10,
        entry_count: 100,
        checksum: id as u32 * 7,
        addresses: vec![id * 3, id * 3 + 1],
    }
}

pub fn insert(level: u8, table: TableInfo) -> ManifestEvent {
    ManifestEvent::Insert {
        tree: 1,
        level,
        table,
    }
}

pub fn remove(level: u8, table: TableInfo) -> ManifestEvent {
    ManifestEvent::Remove {
        tree: 1,
        level,
        table,
    }
}
