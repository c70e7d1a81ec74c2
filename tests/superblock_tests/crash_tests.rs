//! Crash injection during superblock writes

use ledgerstore::storage::{MemoryStorage, Storage};
use ledgerstore::superblock::{FreeSet, SuperBlock};
use ledgerstore::StoreError;

use crate::{device, pointer, small_config, vsr};

/// Free-set stream with the first `n` blocks allocated
fn free_set_with(n: u64) -> Vec<u64> {
    let mut free_set = FreeSet::new(64);
    for _ in 0..n {
        free_set.acquire_block().unwrap();
    }
    free_set.encode_checkpoint()
}

#[test]
fn test_format_then_open() {
    let layout = small_config().layout();
    let storage = device(&layout);
    let formatted = SuperBlock::format(storage.clone(), layout.clone(), vsr(0)).unwrap();
    let opened = SuperBlock::open(storage, layout).unwrap();
    assert_eq!(opened.working(), formatted.working());
    assert_eq!(opened.working().sequence, 1);
    assert_eq!(opened.working().checkpoint_op(), 0);
}

#[test]
fn test_checkpoints_rotate_through_slots() {
    let layout = small_config().layout();
    let storage = device(&layout);
    let mut superblock = SuperBlock::format(storage.clone(), layout.clone(), vsr(0)).unwrap();
    for k in 1..=9u64 {
        let parent = superblock.working().checksum;
        superblock
            .checkpoint(vsr(k * 10), pointer(k), free_set_with(k))
            .unwrap();
        assert_eq!(superblock.working().parent, parent);
    }

    let reads = SuperBlock::read_slots(&storage, &layout).unwrap();
    let mut sequences: Vec<u64> = reads
        .iter()
        .map(|read| read.header.as_ref().unwrap().sequence)
        .collect();
    sequences.sort_unstable();
    assert_eq!(sequences, vec![7, 8, 9, 10]);

    let opened = SuperBlock::open(storage, layout).unwrap();
    assert_eq!(opened.working().checkpoint_op(), 90);
    assert_eq!(opened.working().free_set, free_set_with(9));
}

#[test]
fn test_crash_at_every_byte_of_checkpoint_write() {
    let layout = small_config().layout();
    let storage = device(&layout);
    let mut superblock = SuperBlock::format(storage.clone(), layout.clone(), vsr(0)).unwrap();
    // Fill every slot so the torn write lands over an older valid sequence.
    for k in 1..=5u64 {
        superblock
            .checkpoint(vsr(k), pointer(k), free_set_with(k))
            .unwrap();
    }
    let previous = superblock.working().clone();
    let base = storage.bytes();

    for budget in 0..=layout.superblock_slot_size {
        let storage = MemoryStorage::from_bytes(base.clone());
        let mut superblock = SuperBlock::open(storage.clone(), layout.clone()).unwrap();
        storage.crash_after(budget);
        let outcome = superblock.checkpoint(vsr(6), pointer(6), free_set_with(6));

        let recovered = SuperBlock::open(MemoryStorage::from_bytes(storage.bytes()), layout.clone())
            .unwrap()
            .working()
            .clone();
        if budget < layout.superblock_slot_size {
            assert!(matches!(outcome, Err(StoreError::Crashed)), "budget {}", budget);
        } else {
            outcome.unwrap();
        }
        // Either checkpoint k-1 exactly, or checkpoint k exactly (the torn
        // part of the slot may have been padding identical in both images).
        if recovered.sequence == previous.sequence {
            assert_eq!(recovered, previous, "budget {}", budget);
            assert!(budget < layout.superblock_slot_size);
        } else {
            assert_eq!(recovered.sequence, previous.sequence + 1, "budget {}", budget);
            assert_eq!(recovered.parent, previous.checksum);
            assert_eq!(recovered.checkpoint_op(), 6);
            assert_eq!(recovered.manifest, pointer(6));
            assert_eq!(recovered.free_set, free_set_with(6));
            assert!(budget > 0);
        }
    }
}

#[test]
fn test_corrupt_newest_slot_falls_back() {
    let layout = small_config().layout();
    let storage = device(&layout);
    let mut superblock = SuperBlock::format(storage.clone(), layout.clone(), vsr(0)).unwrap();
    superblock.checkpoint(vsr(1), pointer(1), free_set_with(1)).unwrap();
    let older = superblock.working().clone();
    superblock.checkpoint(vsr(2), pointer(2), free_set_with(2)).unwrap();

    let slot = (superblock.working().sequence % layout.superblock_copies as u64) as u8;
    storage.corrupt(layout.superblock_slot_offset(slot) + 200, &[0xFF]);

    let opened = SuperBlock::open(storage, layout).unwrap();
    assert_eq!(opened.working(), &older);
}

#[test]
fn test_no_valid_slot_is_unrecoverable() {
    let layout = small_config().layout();
    let storage = device(&layout);
    assert!(matches!(
        SuperBlock::open(storage.clone(), layout.clone()),
        Err(StoreError::QuorumUnrecoverable(_))
    ));
    assert_eq!(storage.size(), layout.total_size());
}

#[test]
fn test_view_change_keeps_checkpoint() {
    let layout = small_config().layout();
    let storage = device(&layout);
    let mut superblock = SuperBlock::format(storage.clone(), layout.clone(), vsr(0)).unwrap();
    superblock.checkpoint(vsr(7), pointer(7), free_set_with(3)).unwrap();
    let before = superblock.working().clone();

    superblock.view_change(5, 4, 12).unwrap();
    let opened = SuperBlock::open(storage, layout).unwrap();
    let after = opened.working();
    assert_eq!(after.sequence, before.sequence + 1);
    assert_eq!(after.vsr.view, 5);
    assert_eq!(after.vsr.log_view, 4);
    assert_eq!(after.vsr.commit_max, 12);
    assert_eq!(after.checkpoint_op(), before.checkpoint_op());
    assert_eq!(after.manifest, before.manifest);
    assert_eq!(after.free_set, before.free_set);
}
