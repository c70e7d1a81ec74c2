//! Engine tests
//!
//! These tests verify:
//! - Applied ops are readable at the latest commit and at older snapshots
//! - Checkpoints survive reopen and free journal slots
//! - Journal replay after a crash restores exactly the synced ops
//! - File-backed instances format and reopen through the queued device
//! - Manifest and free set agree after heavy compaction

mod lifecycle_tests;

use ledgerstore::storage::MemoryStorage;
use ledgerstore::{Command, Config, Engine};

// =============================================================================
// Helper Functions
// =============================================================================

pub fn config() -> Config {
    Config::builder()
        .cluster(42, 0, 1)
        .superblock_slot_size(4096)
        .journal_slot_count(256)
        .journal_slot_size(512)
        .manifest_zone_size(256 * 1024)
        .block_size(1024)
        .grid_block_count(2048)
        .buffer_entries_max(64)
        .table_entries_max(32)
        .compaction_work_per_op(16)
        .build()
}

pub fn formatted(config: Config) -> (MemoryStorage, Engine<MemoryStorage>) {
    let storage = MemoryStorage::new(config.layout().total_size());
    let engine = Engine::format(config, storage.clone()).unwrap();
    (storage, engine)
}

pub fn key(k: u32) -> Vec<u8> {
    k.to_be_bytes().to_vec()
}

pub fn upsert(k: u32, value: &str) -> Command {
    Command::Upsert {
        tree: 1,
        key: key(k),
        value: value.as_bytes().to_vec(),
    }
}

pub fn remove(k: u32) -> Command {
    Command::Remove { tree: 1, key: key(k) }
}

/// Apply `commands` at consecutive ops, checkpointing every `every` ops
pub fn apply_all<I>(engine: &mut Engine<MemoryStorage>, commands: I, every: u64)
where
    I: IntoIterator<Item = Command>,
{
    for command in commands {
        let op = engine.commit_op() + 1;
        engine.apply(op, &command).unwrap();
        if op % every == 0 {
            engine.checkpoint(op).unwrap();
        }
    }
}

pub fn scan_keys(engine: &Engine<MemoryStorage>, tree: u16) -> Vec<Vec<u8>> {
    engine
        .scan(tree, ..)
        .unwrap()
        .map(|pair| pair.map(|(k, _)| k))
        .collect::<ledgerstore::Result<Vec<_>>>()
        .unwrap()
}
