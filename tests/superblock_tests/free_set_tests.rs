//! Free set allocation, staging and checkpoint encoding

use ledgerstore::ewah;
use ledgerstore::superblock::FreeSet;
use ledgerstore::{Exhausted, StoreError};

#[test]
fn test_acquire_is_one_based_and_ascending() {
    let mut free_set = FreeSet::new(8);
    let got: Vec<u64> = (0..8).map(|_| free_set.acquire_block().unwrap()).collect();
    assert_eq!(got, (1..=8).collect::<Vec<u64>>());
    assert_eq!(free_set.acquired_count(), 8);
    assert_eq!(free_set.free_count(), 0);
}

#[test]
fn test_exhaustion_distinguishes_backlog_from_full() {
    let mut free_set = FreeSet::new(4);
    for _ in 0..4 {
        free_set.acquire_block().unwrap();
    }
    assert!(matches!(
        free_set.acquire_block(),
        Err(StoreError::Exhausted(Exhausted::GridFull))
    ));

    free_set.release_block(2).unwrap();
    assert!(matches!(
        free_set.acquire_block(),
        Err(StoreError::Exhausted(Exhausted::GridBacklog { staged: 1 }))
    ));

    free_set.checkpoint_durable();
    assert_eq!(free_set.acquire_block().unwrap(), 2);
}

#[test]
fn test_released_block_stays_allocated_until_durable() {
    let mut free_set = FreeSet::new(16);
    let a = free_set.acquire_block().unwrap();
    let b = free_set.acquire_block().unwrap();
    free_set.release_block(a).unwrap();

    assert!(!free_set.is_free(a));
    assert!(free_set.is_staged(a));
    assert_eq!(free_set.staged_count(), 1);

    // The checkpoint image already treats the staged block as free.
    let image = ewah::decode(&free_set.encode_checkpoint(), 16).unwrap();
    assert!(!image.get(a as usize - 1));
    assert!(image.get(b as usize - 1));

    free_set.checkpoint_durable();
    assert!(free_set.is_free(a));
    assert!(!free_set.is_staged(a));
    assert_eq!(free_set.staged_count(), 0);
}

#[test]
fn test_invalid_releases_are_corruption() {
    let mut free_set = FreeSet::new(8);
    assert!(matches!(free_set.release_block(3), Err(StoreError::Corruption(_))));
    assert!(matches!(free_set.release_block(0), Err(StoreError::Corruption(_))));
    assert!(matches!(free_set.release_block(9), Err(StoreError::Corruption(_))));

    let a = free_set.acquire_block().unwrap();
    free_set.release_block(a).unwrap();
    assert!(matches!(free_set.release_block(a), Err(StoreError::Corruption(_))));
}

#[test]
fn test_decode_restores_checkpoint() {
    let mut free_set = FreeSet::new(1000);
    for _ in 0..300 {
        free_set.acquire_block().unwrap();
    }
    for address in (1..=300).step_by(7) {
        free_set.release_block(address).unwrap();
    }
    let stream = free_set.encode_checkpoint();
    let restored = FreeSet::decode(1000, &stream).unwrap();

    assert_eq!(restored.acquired_count(), 300 - (1..=300).step_by(7).count() as u64);
    assert!(restored.is_free(1));
    assert!(!restored.is_free(2));
    assert!(restored.is_free(301));
    assert_eq!(restored.staged_count(), 0);
}
