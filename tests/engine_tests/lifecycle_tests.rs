//! Applying ops, reading them back and checkpointing

use ledgerstore::{Command, Config, Engine, Mutation, StoreError};
use tempfile::TempDir;

use crate::{apply_all, config, formatted, key, remove, scan_keys, upsert};

#[test]
fn test_insert_compact_remove_scan() {
    let (_storage, mut engine) = formatted(config());
    apply_all(&mut engine, (1..=1000).map(|k| upsert(k, "value")), 100);
    engine.compact().unwrap();
    assert_eq!(scan_keys(&engine, 1), (1..=1000).map(key).collect::<Vec<_>>());
    let before_removes = engine.commit_op();

    // No checkpoint here: the snapshot floor stays at op 1000, so the
    // removed values remain visible at that snapshot.
    apply_all(&mut engine, (500..=600).map(remove), u64::MAX);
    engine.compact().unwrap();

    let expected: Vec<Vec<u8>> = (1..500).chain(601..=1000).map(key).collect();
    assert_eq!(scan_keys(&engine, 1), expected);
    assert_eq!(engine.get(1, &key(550)).unwrap(), None);
    assert_eq!(
        engine.get_at(1, &key(550), before_removes).unwrap(),
        Some(b"value".to_vec())
    );
    engine.verify().unwrap();
}

#[test]
fn test_reads_at_snapshots() {
    let (_storage, mut engine) = formatted(config());
    engine.apply(1, &upsert(7, "first")).unwrap();
    engine.apply(2, &upsert(8, "other")).unwrap();
    engine.apply(3, &upsert(7, "second")).unwrap();
    engine.apply(4, &remove(8)).unwrap();

    assert_eq!(engine.get(1, &key(7)).unwrap(), Some(b"second".to_vec()));
    assert_eq!(engine.get_at(1, &key(7), 2).unwrap(), Some(b"first".to_vec()));
    assert_eq!(engine.get_at(1, &key(7), 0).unwrap(), None);
    assert_eq!(engine.get(1, &key(8)).unwrap(), None);
    assert_eq!(engine.get_at(1, &key(8), 3).unwrap(), Some(b"other".to_vec()));

    let at_three: Vec<_> = engine
        .scan_at(1, .., 3)
        .unwrap()
        .collect::<ledgerstore::Result<_>>()
        .unwrap();
    assert_eq!(
        at_three,
        vec![(key(7), b"second".to_vec()), (key(8), b"other".to_vec())]
    );
}

#[test]
fn test_batch_spans_trees_atomically() {
    let (_storage, mut engine) = formatted(config());
    let batch = Command::Batch(vec![
        Mutation::Upsert {
            tree: 1,
            key: key(1),
            value: b"account".to_vec(),
        },
        Mutation::Upsert {
            tree: 2,
            key: key(1),
            value: b"transfer".to_vec(),
        },
    ]);
    engine.apply(1, &batch).unwrap();
    assert_eq!(engine.get(1, &key(1)).unwrap(), Some(b"account".to_vec()));
    assert_eq!(engine.get(2, &key(1)).unwrap(), Some(b"transfer".to_vec()));

    let bad = Command::Batch(vec![
        Mutation::Upsert {
            tree: 1,
            key: key(2),
            value: b"x".to_vec(),
        },
        Mutation::Remove { tree: 9, key: key(2) },
    ]);
    assert!(matches!(engine.apply(2, &bad), Err(StoreError::UnknownTree(9))));
    assert_eq!(engine.commit_op(), 1);
    assert_eq!(engine.journal().head_op(), 1);
    assert_eq!(engine.get(1, &key(2)).unwrap(), None);
    engine.apply(2, &upsert(2, "x")).unwrap();
}

#[test]
fn test_value_larger_than_a_block_is_refused_before_journaling() {
    // Journal slots hold far more than one 512 byte table block.
    let config = Config::builder()
        .cluster(42, 0, 1)
        .superblock_slot_size(4096)
        .journal_slot_count(64)
        .journal_slot_size(4096)
        .manifest_zone_size(64 * 1024)
        .block_size(512)
        .grid_block_count(512)
        .build();
    let (_storage, mut engine) = formatted(config);
    engine.apply(1, &upsert(1, "small")).unwrap();

    let big = Command::Upsert {
        tree: 1,
        key: key(2),
        value: vec![7u8; 1000],
    };
    assert!(matches!(
        engine.apply(2, &big),
        Err(StoreError::EntryTooLarge {
            size: 1020,
            limit: 496
        })
    ));
    assert_eq!(engine.commit_op(), 1);
    assert_eq!(engine.journal().head_op(), 1);

    // The largest value that still fits one block flushes normally.
    let largest = Command::Upsert {
        tree: 1,
        key: key(3),
        value: vec![9u8; 476],
    };
    engine.apply(2, &largest).unwrap();
    engine.checkpoint(2).unwrap();
    engine.apply(3, &upsert(4, "after")).unwrap();
    engine.checkpoint(3).unwrap();

    assert_eq!(engine.get(1, &key(3)).unwrap(), Some(vec![9u8; 476]));
    assert_eq!(engine.get(1, &key(2)).unwrap(), None);
    engine.verify().unwrap();
}

#[test]
fn test_resumed_scan_continues_after_checkpoint() {
    let (_storage, mut engine) = formatted(config());
    apply_all(&mut engine, (1..=300).map(|k| upsert(k, "v")), 100);
    let snapshot = engine.commit_op();

    let (first, cursor) = {
        let mut scan = engine.scan(1, ..).unwrap();
        let first: Vec<_> = scan
            .by_ref()
            .take(120)
            .collect::<ledgerstore::Result<_>>()
            .unwrap();
        (first, scan.cursor())
    };
    assert_eq!(cursor.snapshot, snapshot);

    apply_all(&mut engine, (301..=400).map(|k| upsert(k, "v")), 100);
    engine.compact().unwrap();

    let rest: Vec<_> = engine
        .resume(1, cursor)
        .unwrap()
        .collect::<ledgerstore::Result<_>>()
        .unwrap();
    assert_eq!(first.len() + rest.len(), 300);
    assert_eq!(rest.first().map(|(k, _)| k.clone()), Some(key(121)));
}

#[test]
fn test_checkpoint_frees_journal_and_rotates_superblock() {
    let (_storage, mut engine) = formatted(config());
    let sequence = engine.superblock().working().sequence;
    apply_all(&mut engine, (1..=256).map(|k| upsert(k, "v")), u64::MAX);
    assert!(matches!(
        engine.apply(257, &upsert(257, "v")),
        Err(StoreError::Exhausted(_))
    ));

    engine.checkpoint(256).unwrap();
    assert_eq!(engine.durable_op(), 256);
    assert_eq!(engine.superblock().working().sequence, sequence + 1);
    assert_eq!(engine.superblock().working().vsr.commit_min, 256);
    engine.apply(257, &upsert(257, "v")).unwrap();
}

#[test]
fn test_heavy_compaction_keeps_free_set_consistent() {
    let (_storage, mut engine) = formatted(config());
    for round in 0..5u32 {
        let commands = (0..200u32).map(move |k| {
            if (k + round) % 3 == 0 {
                remove(k)
            } else {
                upsert(k, "round")
            }
        });
        apply_all(&mut engine, commands, 50);
        engine.verify().unwrap();
    }
    engine.compact().unwrap();
    let op = engine.commit_op();
    engine.checkpoint(op).unwrap();
    engine.verify().unwrap();

    let free_set = engine.forest().grid().free_set();
    assert_eq!(free_set.staged_count(), 0);
    assert!(free_set.acquired_count() > 0);
}

#[test]
fn test_file_backed_engine_reopens() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ledger").join("replica0.data");
    let mut config = config();
    config.data_path = path.clone();

    {
        let mut engine = Engine::format_path(config.clone()).unwrap();
        for op in 1..=30u64 {
            engine.apply(op, &upsert(op as u32, "durable")).unwrap();
        }
        engine.checkpoint(30).unwrap();
        for op in 31..=35u64 {
            engine.apply(op, &upsert(op as u32, "journaled")).unwrap();
        }
    }
    assert!(path.exists());

    let engine = Engine::open_path(config).unwrap();
    assert_eq!(engine.durable_op(), 30);
    assert_eq!(engine.commit_op(), 35);
    assert_eq!(engine.get(1, &key(30)).unwrap(), Some(b"durable".to_vec()));
    assert_eq!(engine.get(1, &key(35)).unwrap(), Some(b"journaled".to_vec()));
    engine.verify().unwrap();
}

#[test]
fn test_open_path_without_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config();
    config.data_path = temp_dir.path().join("missing.data");
    assert!(matches!(Engine::open_path(config), Err(StoreError::Io(_))));
}
