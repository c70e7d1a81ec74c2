//! LSM tree tests
//!
//! These tests verify:
//! - Snapshot reads through buffers and every level
//! - Write backpressure while a flush is outstanding
//! - Level sizes stay within capacity after compaction
//! - Scans are ordered, deduplicated and resumable across compaction
//! - A randomized history agrees with an in-memory model

mod model_tests;

use ledgerstore::forest::Grid;
use ledgerstore::lsm::Tree;
use ledgerstore::storage::MemoryStorage;
use ledgerstore::superblock::FreeSet;
use ledgerstore::{Config, LsmConfig, TreeSpec};

// =============================================================================
// Helper Functions
// =============================================================================

pub fn lsm_config() -> LsmConfig {
    LsmConfig {
        levels: 4,
        growth_factor: 2,
        buffer_entries_max: 16,
        table_entries_max: 8,
        compaction_work_per_op: 8,
    }
}

pub fn key(k: u32) -> Vec<u8> {
    k.to_be_bytes().to_vec()
}

pub fn value(k: u32, op: u64) -> Vec<u8> {
    format!("{}@{}", k, op).into_bytes()
}

/// One tree over its own grid
pub struct Harness {
    pub grid: Grid<MemoryStorage>,
    pub tree: Tree,
    pub op: u64,
}

impl Harness {
    pub fn new(lsm: LsmConfig) -> Self {
        let layout = Config::builder()
            .superblock_slot_size(4096)
            .journal_slot_count(4)
            .journal_slot_size(256)
            .manifest_zone_size(8 * 1024)
            .block_size(512)
            .grid_block_count(4096)
            .build()
            .layout();
        let storage = MemoryStorage::new(layout.total_size());
        let free_set = FreeSet::new(layout.block_count);
        Self {
            grid: Grid::new(storage, layout, free_set),
            tree: Tree::new(&TreeSpec::new(1, "test"), lsm),
            op: 0,
        }
    }

    /// Released blocks become reusable, as after a durable checkpoint
    pub fn checkpoint(&mut self) {
        self.grid.free_set_mut().checkpoint_durable();
    }

    fn make_room(&mut self) {
        while self.tree.admit(1).is_err() {
            self.tree.compact_step(&mut self.grid, 64).unwrap();
            self.checkpoint();
        }
    }

    pub fn put(&mut self, k: u32) -> u64 {
        self.make_room();
        self.op += 1;
        self.tree.put(self.op, key(k), value(k, self.op)).unwrap();
        self.tree.compact_step(&mut self.grid, 8).unwrap();
        self.checkpoint();
        self.op
    }

    pub fn remove(&mut self, k: u32) -> u64 {
        self.make_room();
        self.op += 1;
        self.tree.remove(self.op, key(k)).unwrap();
        self.tree.compact_step(&mut self.grid, 8).unwrap();
        self.checkpoint();
        self.op
    }

    pub fn settle(&mut self) {
        self.tree.compact(&mut self.grid).unwrap();
        self.checkpoint();
    }

    pub fn get(&self, k: u32, snapshot: u64) -> Option<Vec<u8>> {
        self.tree.get(&self.grid, &key(k), snapshot).unwrap()
    }

    pub fn scan_all(&self, snapshot: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.tree
            .scan(&self.grid, .., snapshot)
            .collect::<ledgerstore::Result<Vec<_>>>()
            .unwrap()
    }
}
