//! Journal recovery from clean, torn and corrupt rings

use ledgerstore::checksum::checksum;
use ledgerstore::journal::{recover, InvalidRecord, Journal, RecordHeader, RecoveryStop};
use ledgerstore::storage::{MemoryStorage, Storage};
use ledgerstore::StoreError;

use crate::{append_range, command, formatted};

// =============================================================================
// Clean Journal Tests
// =============================================================================

#[test]
fn test_recover_empty_journal() {
    let (storage, layout, _journal) = formatted();
    let recovered = recover(&storage, &layout, 0).unwrap();
    assert!(recovered.entries.is_empty());
    assert_eq!(recovered.report.last_op, 0);
    assert_eq!(recovered.report.stop, RecoveryStop::End);
}

#[test]
fn test_recover_all_entries() {
    let (storage, layout, mut journal) = formatted();
    append_range(&mut journal, 1..=10);

    let recovered = recover(&storage, &layout, 0).unwrap();
    assert_eq!(recovered.entries.len(), 10);
    assert_eq!(recovered.report.entries_recovered, 10);
    assert_eq!(recovered.report.last_op, 10);
    for (i, entry) in recovered.entries.iter().enumerate() {
        assert_eq!(entry.op, i as u64 + 1);
        assert_eq!(entry.command, command(entry.op));
    }
}

#[test]
fn test_full_ring_stops_at_ring_end() {
    let (storage, layout, mut journal) = formatted();
    append_range(&mut journal, 1..=16);
    let recovered = recover(&storage, &layout, 0).unwrap();
    assert_eq!(recovered.entries.len(), 16);
    assert_eq!(recovered.report.stop, RecoveryStop::RingEnd);
}

#[test]
fn test_recover_from_checkpoint_skips_captured_ops() {
    let (storage, layout, mut journal) = formatted();
    append_range(&mut journal, 1..=10);
    let recovered = recover(&storage, &layout, 6).unwrap();
    let ops: Vec<u64> = recovered.entries.iter().map(|e| e.op).collect();
    assert_eq!(ops, vec![7, 8, 9, 10]);
}

// =============================================================================
// Torn Write Tests
// =============================================================================

#[test]
fn test_torn_tail_is_truncated() {
    let (base, layout, mut journal) = formatted();
    append_range(&mut journal, 1..=5);
    let image = base.bytes();
    let record_len = 32 + command(6).encode().unwrap().len() as u64;

    for budget in [0, 10, 31, 32, 40, record_len - 1] {
        let storage = MemoryStorage::from_bytes(image.clone());
        let (mut journal, _) = Journal::open(storage.clone(), layout.clone(), 0).unwrap();
        storage.crash_after(budget);
        assert!(matches!(
            journal.append(6, &command(6)),
            Err(StoreError::Crashed)
        ));

        let survivor = MemoryStorage::from_bytes(storage.bytes());
        let recovered = recover(&survivor, &layout, 0).unwrap();
        assert_eq!(recovered.entries.len(), 5, "budget {}", budget);
        if budget == 0 {
            assert_eq!(recovered.report.stop, RecoveryStop::End);
        } else {
            assert!(recovered.report.was_truncated(), "budget {}", budget);
            assert!(recovered.report.stop.error().unwrap().is_integrity());
        }
    }
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_corrupt_body_stops_replay() {
    let (storage, layout, mut journal) = formatted();
    append_range(&mut journal, 1..=8);
    storage.corrupt(layout.journal_slot_offset(4) + 32 + 2, &[0xEE]);

    let recovered = recover(&storage, &layout, 0).unwrap();
    assert_eq!(recovered.entries.len(), 3);
    assert!(matches!(
        recovered.report.stop,
        RecoveryStop::Invalid {
            op: 4,
            kind: InvalidRecord::BodyChecksum,
            ..
        }
    ));
    assert!(matches!(
        recovered.report.stop.error(),
        Some(StoreError::Checksum { .. })
    ));
}

#[test]
fn test_corrupt_header_stops_replay() {
    let (storage, layout, mut journal) = formatted();
    append_range(&mut journal, 1..=8);
    storage.corrupt(layout.journal_slot_offset(6) + 9, &[0x5A]);

    let recovered = recover(&storage, &layout, 0).unwrap();
    assert_eq!(recovered.entries.len(), 5);
    assert!(matches!(
        recovered.report.stop,
        RecoveryStop::Invalid {
            op: 6,
            kind: InvalidRecord::HeaderChecksum,
            ..
        }
    ));
}

#[test]
fn test_record_from_other_history_breaks_parent_chain() {
    let (storage, layout, mut journal) = formatted();
    append_range(&mut journal, 1..=5);

    let (other, _, mut other_journal) = formatted();
    other_journal.append(1, &ledgerstore::Command::Noop).unwrap();
    append_range(&mut other_journal, 2..=3);

    // Op 3 of the other history has valid checksums but chains from a
    // different op 2.
    let offset = layout.journal_slot_offset(3);
    let mut slot = vec![0u8; layout.journal_slot_size as usize];
    other.read(offset, &mut slot).unwrap();
    storage.corrupt(offset, &slot);

    let recovered = recover(&storage, &layout, 0).unwrap();
    assert_eq!(recovered.entries.len(), 2);
    assert!(matches!(
        recovered.report.stop,
        RecoveryStop::Invalid {
            op: 3,
            kind: InvalidRecord::Parent,
            ..
        }
    ));
}

#[test]
fn test_declared_size_past_slot_is_torn() {
    let (storage, layout, mut journal) = formatted();
    append_range(&mut journal, 1..=2);

    let recovered = recover(&storage, &layout, 0).unwrap();
    let parent = recovered.entries[1].checksum;
    let body = command(3).encode().unwrap();
    let mut header = RecordHeader::new(3, command(3).tag() as u8, parent, &body);
    header.size = 10_000;
    header.checksum = checksum(&header.encode()[4..]);
    let offset = layout.journal_slot_offset(3);
    storage.corrupt(offset, &header.encode());
    storage.corrupt(offset + 32, &body);

    let recovered = recover(&storage, &layout, 0).unwrap();
    assert_eq!(recovered.entries.len(), 2);
    match recovered.report.stop {
        RecoveryStop::Invalid {
            kind: InvalidRecord::Size { declared, available },
            ..
        } => {
            assert_eq!(declared, 10_000);
            assert_eq!(available, layout.journal_slot_size - 32);
        }
        other => panic!("unexpected stop {:?}", other),
    }
    assert!(matches!(
        recovered.report.stop.error(),
        Some(StoreError::TornWrite { .. })
    ));
}
