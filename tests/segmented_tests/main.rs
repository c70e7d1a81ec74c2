//! Segmented ordered container tests
//!
//! These tests verify:
//! - Iteration order matches a `BTreeSet` model after any insert/remove mix
//! - Segment watermarks hold after splits and merges
//! - Cursor lookups and bidirectional iteration

use std::collections::BTreeSet;

use ledgerstore::segmented::SegmentedArray;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Insert(u16),
    Remove(u16),
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    // A small key space so removes often hit.
    let op = prop_oneof![
        3 => (0u16..512).prop_map(Op::Insert),
        2 => (0u16..512).prop_map(Op::Remove),
    ];
    prop::collection::vec(op, 0..1500)
}

// =============================================================================
// Model Check
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_matches_btreeset(ops in ops_strategy(), capacity in 4usize..24) {
        let mut array = SegmentedArray::new(capacity);
        let mut model = BTreeSet::new();

        for op in ops {
            match op {
                Op::Insert(value) => {
                    let replaced = array.insert(value).is_some();
                    prop_assert_eq!(replaced, !model.insert(value));
                }
                Op::Remove(value) => {
                    prop_assert_eq!(array.remove(&value), model.take(&value));
                }
            }
            prop_assert_eq!(array.len(), model.len());
        }

        prop_assert!(array.verify().is_ok(), "{:?}", array.verify());
        let got: Vec<u16> = array.iter().copied().collect();
        let expected: Vec<u16> = model.iter().copied().collect();
        prop_assert_eq!(got, expected);

        let got_rev: Vec<u16> = array.iter().rev().copied().collect();
        let expected_rev: Vec<u16> = model.iter().rev().copied().collect();
        prop_assert_eq!(got_rev, expected_rev);
    }

    #[test]
    fn prop_lower_bound_matches_range(values in prop::collection::btree_set(0u32..10_000, 0..400), probe in 0u32..10_000) {
        let array: SegmentedArray<u32> = values.iter().copied().collect();
        let cursor = array.lower_bound_by(|v| v.cmp(&probe));

        let from: Vec<u32> = array.iter_from(cursor).copied().collect();
        let expected: Vec<u32> = values.range(probe..).copied().collect();
        prop_assert_eq!(from, expected);

        let before: Vec<u32> = array.iter_before(cursor).copied().collect();
        let expected_before: Vec<u32> = values.range(..probe).rev().copied().collect();
        prop_assert_eq!(before, expected_before);
    }
}

// =============================================================================
// Structural Tests
// =============================================================================

#[test]
fn test_sequential_inserts_split_segments() {
    let mut array = SegmentedArray::new(8);
    for value in 0..100u32 {
        array.insert(value);
    }
    assert!(array.segment_count() > 1);
    assert_eq!(array.first(), Some(&0));
    assert_eq!(array.last(), Some(&99));
    array.verify().unwrap();
}

#[test]
fn test_draining_merges_segments() {
    let mut array = SegmentedArray::new(8);
    for value in 0..200u32 {
        array.insert(value);
    }
    let before = array.segment_count();
    for value in (0..200u32).filter(|v| v % 10 != 0) {
        assert_eq!(array.remove(&value), Some(value));
        array.verify().unwrap();
    }
    assert_eq!(array.len(), 20);
    assert!(array.segment_count() < before);
}

#[test]
fn test_remove_everything_leaves_empty() {
    let mut array: SegmentedArray<u32> = (0..50).collect();
    for value in 0..50u32 {
        array.remove(&value);
    }
    assert!(array.is_empty());
    assert_eq!(array.segment_count(), 0);
    assert_eq!(array.iter().next(), None);
    assert_eq!(array.remove(&3), None);
}

#[test]
fn test_find_by_and_contains() {
    let array: SegmentedArray<u32> = (0..300).map(|v| v * 3).collect();
    assert_eq!(array.find_by(|v| v.cmp(&42)), Some(&42));
    assert_eq!(array.find_by(|v| v.cmp(&43)), None);
    assert!(array.contains(&897));
    assert!(!array.contains(&898));
}
