//! Randomized histories checked against an in-memory model

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::{key, value, Harness};
use ledgerstore::LsmConfig;

#[derive(Debug, Clone)]
enum Action {
    Put(u32),
    Remove(u32),
    Compact,
    Floor,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        6 => (0u32..40).prop_map(Action::Put),
        3 => (0u32..40).prop_map(Action::Remove),
        1 => Just(Action::Compact),
        1 => Just(Action::Floor),
    ]
}

/// Every version ever written, keyed by (key, op)
#[derive(Default)]
struct Model {
    versions: BTreeMap<(u32, u64), Option<Vec<u8>>>,
}

impl Model {
    fn get(&self, k: u32, snapshot: u64) -> Option<Vec<u8>> {
        self.versions
            .range((k, 0)..=(k, snapshot))
            .next_back()
            .and_then(|(_, value)| value.clone())
    }

    fn live(&self, snapshot: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
        (0..40)
            .filter_map(|k| self.get(k, snapshot).map(|v| (key(k), v)))
            .collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_tree_matches_model(
        actions in prop::collection::vec(action_strategy(), 1..400),
        buffer_entries_max in 4usize..24,
    ) {
        let mut h = Harness::new(LsmConfig {
            levels: 3,
            growth_factor: 2,
            buffer_entries_max,
            table_entries_max: 6,
            compaction_work_per_op: 4,
        });
        let mut model = Model::default();
        let mut floor = 0;

        for action in &actions {
            match action {
                Action::Put(k) => {
                    let op = h.put(*k);
                    model.versions.insert((*k, op), Some(value(*k, op)));
                }
                Action::Remove(k) => {
                    let op = h.remove(*k);
                    model.versions.insert((*k, op), None);
                }
                Action::Compact => h.settle(),
                Action::Floor => {
                    floor = h.op;
                    h.tree.set_snapshot_floor(floor);
                }
            }
        }

        let last = h.op;
        for snapshot in [floor, floor + (last - floor) / 2, last, u64::MAX] {
            for k in 0..40 {
                prop_assert_eq!(h.get(k, snapshot), model.get(k, snapshot), "key {} at {}", k, snapshot);
            }
            prop_assert_eq!(h.scan_all(snapshot), model.live(snapshot));
        }

        h.settle();
        h.tree.manifest().verify().unwrap();
        prop_assert_eq!(h.scan_all(u64::MAX), model.live(u64::MAX));
        prop_assert_eq!(h.scan_all(last), model.live(last));
    }
}
