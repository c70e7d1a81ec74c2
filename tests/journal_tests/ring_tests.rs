//! Appending to the journal ring

use ledgerstore::journal::{Command, Journal, RecoveryStop};
use ledgerstore::{Exhausted, StoreError};

use crate::{append_range, command, formatted};

#[test]
fn test_append_requires_next_op() {
    let (_storage, _layout, mut journal) = formatted();
    assert!(matches!(
        journal.append(2, &Command::Noop),
        Err(StoreError::OpOrder { expected: 1, got: 2 })
    ));
    journal.append(1, &Command::Noop).unwrap();
    assert!(matches!(
        journal.append(1, &Command::Noop),
        Err(StoreError::OpOrder { expected: 2, got: 1 })
    ));
    assert_eq!(journal.head_op(), 1);
}

#[test]
fn test_full_ring_needs_checkpoint() {
    let (_storage, _layout, mut journal) = formatted();
    append_range(&mut journal, 1..=16);
    assert_eq!(journal.remaining(), 0);
    assert!(matches!(
        journal.append(17, &command(17)),
        Err(StoreError::Exhausted(Exhausted::JournalFull { checkpoint_op: 0 }))
    ));

    journal.checkpoint(8).unwrap();
    assert_eq!(journal.remaining(), 8);
    append_range(&mut journal, 17..=24);
    assert!(journal.append(25, &command(25)).is_err());
}

#[test]
fn test_checkpoint_bounds() {
    let (_storage, _layout, mut journal) = formatted();
    append_range(&mut journal, 1..=4);
    assert!(journal.checkpoint(5).is_err());
    journal.checkpoint(3).unwrap();
    assert!(journal.checkpoint(2).is_err());
    assert_eq!(journal.checkpoint_op(), 3);
}

#[test]
fn test_oversized_command_rejected() {
    let (_storage, _layout, mut journal) = formatted();
    let big = Command::Upsert {
        tree: 1,
        key: b"k".to_vec(),
        value: vec![7; 1024],
    };
    assert!(matches!(
        journal.append(1, &big),
        Err(StoreError::EntryTooLarge { .. })
    ));
    journal.append(1, &Command::Noop).unwrap();
}

#[test]
fn test_wrapped_ring_recovers_after_checkpoint() {
    let (storage, layout, mut journal) = formatted();
    append_range(&mut journal, 1..=16);
    journal.checkpoint(8).unwrap();
    append_range(&mut journal, 17..=20);

    let (reopened, recovered) = Journal::open(storage, layout, 8).unwrap();
    let ops: Vec<u64> = recovered.entries.iter().map(|e| e.op).collect();
    assert_eq!(ops, (9..=20).collect::<Vec<u64>>());
    assert_eq!(recovered.report.stop, RecoveryStop::End);
    assert_eq!(reopened.head_op(), 20);
    for entry in &recovered.entries {
        assert_eq!(entry.command, command(entry.op));
    }
}

#[test]
fn test_reopened_journal_extends_chain() {
    let (storage, layout, mut journal) = formatted();
    append_range(&mut journal, 1..=5);

    let (mut reopened, _) = Journal::open(storage.clone(), layout.clone(), 0).unwrap();
    append_range(&mut reopened, 6..=7);

    let (_, recovered) = Journal::open(storage, layout, 0).unwrap();
    assert_eq!(recovered.entries.len(), 7);
    assert!(!recovered.report.was_truncated());
}
