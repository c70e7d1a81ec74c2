//! Range scans
//!
//! A scan yields live key-value pairs in ascending key order as of one
//! snapshot. Its position is a `ScanCursor`, which can be kept and resumed
//! later, even after compaction has replaced the tables it was reading.

use std::ops::Bound;

use crate::error::Result;
use crate::forest::Grid;
use crate::storage::Storage;

use super::merge::Merge;

/// Resumable scan position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCursor {
    /// Keys at or past this bound remain
    pub start: Bound<Vec<u8>>,
    pub end: Bound<Vec<u8>>,
    pub snapshot: u64,
    pub exhausted: bool,
}

impl ScanCursor {
    pub fn new(start: Bound<Vec<u8>>, end: Bound<Vec<u8>>, snapshot: u64) -> Self {
        Self {
            start,
            end,
            snapshot,
            exhausted: false,
        }
    }

    pub(crate) fn before_end(&self, key: &[u8]) -> bool {
        match &self.end {
            Bound::Included(end) => key <= end.as_slice(),
            Bound::Excluded(end) => key < end.as_slice(),
            Bound::Unbounded => true,
        }
    }
}

/// Lazy scan over one tree
pub struct Scan<'a, S: Storage> {
    grid: &'a Grid<S>,
    merge: Merge<'a>,
    cursor: ScanCursor,
    /// Key whose visible version has already been decided
    settled: Option<Vec<u8>>,
}

impl<'a, S: Storage> Scan<'a, S> {
    pub(crate) fn new(grid: &'a Grid<S>, merge: Merge<'a>, cursor: ScanCursor) -> Self {
        Self {
            grid,
            merge,
            cursor,
            settled: None,
        }
    }

    /// Position after the last pair yielded
    pub fn cursor(&self) -> ScanCursor {
        self.cursor.clone()
    }

    fn advance(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        while !self.cursor.exhausted {
            let entry = match self.merge.next_entry(self.grid)? {
                Some(entry) => entry,
                None => {
                    self.cursor.exhausted = true;
                    break;
                }
            };
            if !self.cursor.before_end(&entry.key) {
                self.cursor.exhausted = true;
                break;
            }
            if self.settled.as_deref() == Some(entry.key.as_slice()) {
                continue;
            }
            if entry.op > self.cursor.snapshot {
                continue;
            }
            self.settled = Some(entry.key.clone());
            self.cursor.start = Bound::Excluded(entry.key.clone());
            if let Some(value) = entry.value {
                return Ok(Some((entry.key, value)));
            }
        }
        Ok(None)
    }
}

impl<S: Storage> Iterator for Scan<'_, S> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(pair) => pair.map(Ok),
            Err(err) => {
                self.cursor.exhausted = true;
                Some(Err(err))
            }
        }
    }
}
