//! In-memory buffers
//!
//! The mutable buffer is a `BTreeMap` keyed by `(key, Reverse(op))`, so a
//! forward range walks keys in ascending order and each key's versions
//! newest first. A full buffer is frozen into a sorted vector that stays
//! readable until its flush commits.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::Bound;

use super::Entry;

/// Mutable level-0 buffer
#[derive(Debug, Default)]
pub struct Buffer {
    entries: BTreeMap<(Vec<u8>, Reverse<u64>), Option<Vec<u8>>>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a version; a second write of the same key at the same op
    /// replaces the first
    pub fn insert(&mut self, key: Vec<u8>, op: u64, value: Option<Vec<u8>>) {
        self.entries.insert((key, Reverse(op)), value);
    }

    /// Newest version of `key` at or below `snapshot`
    pub fn get(&self, key: &[u8], snapshot: u64) -> Option<Entry> {
        self.entries
            .range((key.to_vec(), Reverse(snapshot))..)
            .next()
            .filter(|((found, _), _)| found.as_slice() == key)
            .map(|((found, Reverse(op)), value)| Entry {
                key: found.clone(),
                op: *op,
                value: value.clone(),
            })
    }

    /// Versions with keys after `start`, in merge order
    pub fn range(&self, start: Bound<&[u8]>) -> impl Iterator<Item = Entry> + '_ {
        let lower = match start {
            Bound::Included(key) => Bound::Included((key.to_vec(), Reverse(u64::MAX))),
            // Op 0 is never written, so this excludes every version of `key`.
            Bound::Excluded(key) => Bound::Excluded((key.to_vec(), Reverse(0))),
            Bound::Unbounded => Bound::Unbounded,
        };
        self.entries
            .range((lower, Bound::Unbounded))
            .map(|((key, Reverse(op)), value)| Entry {
                key: key.clone(),
                op: *op,
                value: value.clone(),
            })
    }

    /// Freeze into an immutable sorted run
    pub fn freeze(self) -> Frozen {
        let entries = self
            .entries
            .into_iter()
            .map(|((key, Reverse(op)), value)| Entry { key, op, value })
            .collect();
        Frozen { entries }
    }
}

/// Immutable buffer awaiting flush
#[derive(Debug, Clone)]
pub struct Frozen {
    entries: Vec<Entry>,
}

impl Frozen {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn key_min(&self) -> Option<&[u8]> {
        self.entries.first().map(|e| e.key.as_slice())
    }

    pub fn key_max(&self) -> Option<&[u8]> {
        self.entries.last().map(|e| e.key.as_slice())
    }

    pub fn get(&self, key: &[u8], snapshot: u64) -> Option<Entry> {
        let index = self
            .entries
            .partition_point(|e| (e.key.as_slice(), Reverse(e.op)) < (key, Reverse(snapshot)));
        self.entries
            .get(index)
            .filter(|e| e.key.as_slice() == key)
            .cloned()
    }

    /// Index of the first entry after `start`
    pub fn position(&self, start: Bound<&[u8]>) -> usize {
        match start {
            Bound::Included(key) => self.entries.partition_point(|e| e.key.as_slice() < key),
            Bound::Excluded(key) => self.entries.partition_point(|e| e.key.as_slice() <= key),
            Bound::Unbounded => 0,
        }
    }
}
