//! Superblock tests
//!
//! These tests verify:
//! - A crash at any byte of a checkpoint write recovers to k or k-1
//! - Local slot selection and its failure modes
//! - Cluster quorum never adopts a minority header
//! - Free set staging, exhaustion kinds and checkpoint encoding

mod crash_tests;
mod free_set_tests;

use ledgerstore::storage::{Layout, MemoryStorage};
use ledgerstore::superblock::{ManifestPointer, SuperBlockHeader, VsrState};
use ledgerstore::Config;

// =============================================================================
// Helper Functions
// =============================================================================

pub fn small_config() -> Config {
    Config::builder()
        .superblock_slot_size(1024)
        .journal_slot_count(4)
        .journal_slot_size(256)
        .manifest_zone_size(8 * 1024)
        .block_size(512)
        .grid_block_count(64)
        .build()
}

pub fn device(layout: &Layout) -> MemoryStorage {
    MemoryStorage::new(layout.total_size())
}

pub fn vsr(commit: u64) -> VsrState {
    VsrState {
        cluster: 42,
        replica: 0,
        replica_count: 3,
        view: 1,
        log_view: 1,
        commit_min: commit,
        commit_max: commit,
    }
}

pub fn pointer(op: u64) -> ManifestPointer {
    ManifestPointer {
        half: (op % 2) as u32,
        length: op * 40,
        op,
    }
}

/// A standalone header with its checksum filled in
pub fn header(sequence: u64, commit: u64) -> SuperBlockHeader {
    let mut header = SuperBlockHeader {
        checksum: 0,
        sequence,
        parent: 0,
        vsr: vsr(commit),
        manifest: pointer(commit),
        free_set_len: 64,
        free_set: vec![],
    };
    header.encode(1024).unwrap();
    header
}
