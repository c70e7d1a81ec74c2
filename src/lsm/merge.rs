//! K-way merge over buffers and levels
//!
//! Sources are listed newest first. The merge yields every version of
//! every key in merge order (key ascending, op descending); equal versions
//! are broken by source priority.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;

use crate::error::Result;
use crate::forest::Grid;
use crate::manifest::TableInfo;
use crate::storage::Storage;

use super::buffer::Frozen;
use super::table::TableSource;
use super::Entry;

/// One input of a merge
pub(crate) enum Source<'a> {
    /// Borrowed mutable buffer range
    Buffer(Box<dyn Iterator<Item = Entry> + 'a>),
    /// Frozen buffer, read from `position` on
    Frozen { run: Arc<Frozen>, position: usize },
    /// Tables of one level in key order
    Level(LevelSource),
}

impl Source<'_> {
    fn next_entry<S: Storage>(&mut self, grid: &Grid<S>) -> Result<Option<Entry>> {
        match self {
            Source::Buffer(iter) => Ok(iter.next()),
            Source::Frozen { run, position } => {
                let entry = run.entries().get(*position).cloned();
                *position += 1;
                Ok(entry)
            }
            Source::Level(level) => level.next_entry(grid),
        }
    }
}

/// Disjoint tables of one level, opened one at a time
pub(crate) struct LevelSource {
    tables: VecDeque<TableInfo>,
    start: Bound<Vec<u8>>,
    current: Option<TableSource>,
}

impl LevelSource {
    pub(crate) fn new(tables: Vec<TableInfo>, start: Bound<Vec<u8>>) -> Self {
        Self {
            tables: tables.into(),
            start,
            current: None,
        }
    }

    fn next_entry<S: Storage>(&mut self, grid: &Grid<S>) -> Result<Option<Entry>> {
        loop {
            if self.current.is_none() {
                match self.tables.pop_front() {
                    Some(table) => {
                        self.current = Some(TableSource::new(table, self.start.clone()));
                    }
                    None => return Ok(None),
                }
            }
            if let Some(current) = self.current.as_mut() {
                match current.next_entry(grid)? {
                    Some(entry) => return Ok(Some(entry)),
                    None => self.current = None,
                }
            }
        }
    }
}

struct HeapEntry {
    entry: Entry,
    source: usize,
}

impl HeapEntry {
    fn rank(&self) -> (&[u8], Reverse<u64>, usize) {
        (self.entry.key.as_slice(), Reverse(self.entry.op), self.source)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // BinaryHeap pops the greatest; the smallest rank must come out first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.rank().cmp(&self.rank())
    }
}

/// Merge of several sorted sources
pub(crate) struct Merge<'a> {
    sources: Vec<Source<'a>>,
    heap: BinaryHeap<HeapEntry>,
    primed: bool,
}

impl<'a> Merge<'a> {
    pub(crate) fn new(sources: Vec<Source<'a>>) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            primed: false,
        }
    }

    pub(crate) fn next_entry<S: Storage>(&mut self, grid: &Grid<S>) -> Result<Option<Entry>> {
        if !self.primed {
            for source in 0..self.sources.len() {
                if let Some(entry) = self.sources[source].next_entry(grid)? {
                    self.heap.push(HeapEntry { entry, source });
                }
            }
            self.primed = true;
        }
        let top = match self.heap.pop() {
            Some(top) => top,
            None => return Ok(None),
        };
        if let Some(entry) = self.sources[top.source].next_entry(grid)? {
            self.heap.push(HeapEntry {
                entry,
                source: top.source,
            });
        }
        Ok(Some(top.entry))
    }
}
