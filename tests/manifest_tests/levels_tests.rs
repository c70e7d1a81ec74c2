//! Per-tree level bookkeeping

use ledgerstore::manifest::{Manifest, ManifestEvent};
use ledgerstore::StoreError;

use crate::{insert, remove, table};

fn manifest() -> Manifest {
    let mut manifest = Manifest::new(1, 3);
    manifest.insert(1, table(1, 10, 19)).unwrap();
    manifest.insert(1, table(2, 30, 39)).unwrap();
    manifest.insert(1, table(3, 50, 59)).unwrap();
    manifest.insert(2, table(4, 0, 100)).unwrap();
    manifest
}

fn ids<'a>(tables: impl IntoIterator<Item = &'a ledgerstore::manifest::TableInfo>) -> Vec<u64> {
    tables.into_iter().map(|t| t.id).collect()
}

#[test]
fn test_overlapping_insert_is_rejected() {
    let mut manifest = manifest();
    assert!(matches!(
        manifest.insert(1, table(9, 15, 25)),
        Err(StoreError::Corruption(_))
    ));
    assert!(manifest.insert(1, table(9, 20, 29)).is_ok());
    assert_eq!(manifest.table_count(1), 4);
    manifest.verify().unwrap();
}

#[test]
fn test_find_by_key() {
    let manifest = manifest();
    assert_eq!(manifest.find(1, &[10]).map(|t| t.id), Some(1));
    assert_eq!(manifest.find(1, &[39]).map(|t| t.id), Some(2));
    assert_eq!(manifest.find(1, &[25]), None);
    assert_eq!(manifest.find(1, &[60]), None);
    assert_eq!(manifest.find(2, &[25]).map(|t| t.id), Some(4));
    assert_eq!(manifest.find(3, &[25]), None);
}

#[test]
fn test_overlapping_range() {
    let manifest = manifest();
    assert_eq!(ids(manifest.overlapping(1, &[15], &[50]).unwrap()), vec![1, 2, 3]);
    assert_eq!(ids(manifest.overlapping(1, &[20], &[29]).unwrap()), Vec::<u64>::new());
    assert_eq!(ids(manifest.overlapping(1, &[39], &[39]).unwrap()), vec![2]);
    assert!(manifest.overlapping(4, &[0], &[1]).is_err());
}

#[test]
fn test_tables_from_key() {
    let manifest = manifest();
    assert_eq!(ids(manifest.tables_from(1, &[35])), vec![2, 3]);
    assert_eq!(ids(manifest.tables_from(1, &[0])), vec![1, 2, 3]);
    assert_eq!(ids(manifest.tables_from(1, &[60])), Vec::<u64>::new());
}

#[test]
fn test_remove_requires_live_table() {
    let mut manifest = manifest();
    let removed = manifest.remove(1, &table(2, 30, 39)).unwrap();
    assert_eq!(removed.id, 2);
    assert!(manifest.remove(1, &table(2, 30, 39)).is_err());
    assert!(manifest.remove(2, &table(1, 10, 19)).is_err());
    assert_eq!(manifest.total_tables(), 3);
}

#[test]
fn test_level_out_of_range() {
    let mut manifest = manifest();
    assert!(manifest.insert(0, table(9, 0, 1)).is_err());
    assert!(manifest.insert(4, table(9, 0, 1)).is_err());
    assert_eq!(manifest.tables(0).count(), 0);
    assert_eq!(manifest.table_count(7), 0);
}

#[test]
fn test_events_for_other_tree_rejected() {
    let mut manifest = manifest();
    let event = ManifestEvent::Insert {
        tree: 2,
        level: 1,
        table: table(9, 0, 1),
    };
    assert!(matches!(manifest.apply(&event), Err(StoreError::UnknownTree(2))));
}

#[test]
fn test_live_events_rebuild_manifest() {
    let mut manifest = manifest();
    manifest.apply(&remove(1, table(1, 10, 19))).unwrap();
    manifest.apply(&insert(3, table(5, 0, 255))).unwrap();

    let mut rebuilt = Manifest::new(1, 3);
    for event in manifest.live_events() {
        rebuilt.apply(&event).unwrap();
    }
    let before: Vec<(u8, u64)> = manifest.all_tables().map(|(l, t)| (l, t.id)).collect();
    let after: Vec<(u8, u64)> = rebuilt.all_tables().map(|(l, t)| (l, t.id)).collect();
    assert_eq!(before, vec![(1, 2), (1, 3), (2, 4), (3, 5)]);
    assert_eq!(before, after);
    rebuilt.verify().unwrap();
}
