//! Compaction jobs
//!
//! A job merges its inputs into new tables at `target`, a bounded slice of
//! work per step, and is committed by the tree once the merge is drained.
//! Until then the inputs stay live and the outputs stay invisible, so reads
//! never observe a half-finished job.

use std::ops::Bound;
use std::sync::Arc;

use crate::error::Result;
use crate::forest::Grid;
use crate::manifest::{Manifest, TableInfo};
use crate::storage::Storage;

use super::buffer::Frozen;
use super::merge::{LevelSource, Merge, Source};
use super::table::TableBuilder;
use super::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobKind {
    /// Frozen buffer plus overlapping level-1 tables into level 1
    Flush,
    /// One table of `level` plus its overlap in `level + 1`
    Merge { level: u8 },
}

pub(crate) struct StepOutcome {
    /// Input entries consumed
    pub work: usize,
    pub done: bool,
}

/// Which versions of a key survive a merge
///
/// Versions above the snapshot floor are kept. At or below it only the
/// newest survives, and not even that one when it is a tombstone that
/// shadows nothing deeper than the target level.
struct Retention {
    floor: u64,
    key: Option<Vec<u8>>,
    settled: bool,
}

impl Retention {
    fn new(floor: u64) -> Self {
        Self {
            floor,
            key: None,
            settled: false,
        }
    }

    fn keep(&mut self, entry: &Entry, manifest: &Manifest, target: u8) -> bool {
        if self.key.as_deref() != Some(entry.key.as_slice()) {
            self.key = Some(entry.key.clone());
            self.settled = false;
        }
        if entry.op > self.floor {
            return true;
        }
        if self.settled {
            return false;
        }
        self.settled = true;
        !(entry.is_tombstone() && !deeper_overlap(manifest, target, &entry.key))
    }
}

fn deeper_overlap(manifest: &Manifest, target: u8, key: &[u8]) -> bool {
    (target + 1..=manifest.level_count()).any(|level| manifest.find(level, key).is_some())
}

pub(crate) struct Job {
    pub kind: JobKind,
    pub target: u8,
    /// Tables replaced by the outputs, with their levels
    pub inputs: Vec<(u8, TableInfo)>,
    pub outputs: Vec<TableInfo>,
    /// Input entries consumed so far
    pub consumed: u64,
    merge: Merge<'static>,
    retention: Retention,
    /// Retained entry that could not be placed yet
    pending: Option<Entry>,
    builder: Option<TableBuilder>,
}

impl Job {
    pub fn flush(run: Arc<Frozen>, overlap: Vec<TableInfo>, floor: u64) -> Self {
        let inputs = overlap.iter().map(|t| (1, t.clone())).collect();
        let merge = Merge::new(vec![
            Source::Frozen { run, position: 0 },
            Source::Level(LevelSource::new(overlap, Bound::Unbounded)),
        ]);
        Self::new(JobKind::Flush, 1, inputs, merge, floor)
    }

    pub fn merge(level: u8, table: TableInfo, overlap: Vec<TableInfo>, floor: u64) -> Self {
        let mut inputs = vec![(level, table.clone())];
        inputs.extend(overlap.iter().map(|t| (level + 1, t.clone())));
        let merge = Merge::new(vec![
            Source::Level(LevelSource::new(vec![table], Bound::Unbounded)),
            Source::Level(LevelSource::new(overlap, Bound::Unbounded)),
        ]);
        Self::new(JobKind::Merge { level }, level + 1, inputs, merge, floor)
    }

    fn new(
        kind: JobKind,
        target: u8,
        inputs: Vec<(u8, TableInfo)>,
        merge: Merge<'static>,
        floor: u64,
    ) -> Self {
        Self {
            kind,
            target,
            inputs,
            outputs: Vec::new(),
            consumed: 0,
            merge,
            retention: Retention::new(floor),
            pending: None,
            builder: None,
        }
    }

    /// Consume up to `budget` input entries
    pub fn step<S: Storage>(
        &mut self,
        grid: &mut Grid<S>,
        manifest: &Manifest,
        budget: usize,
        next_table_id: &mut u64,
        table_entries_max: usize,
    ) -> Result<StepOutcome> {
        let mut work = 0;
        while work < budget {
            let entry = match self.pending.take() {
                Some(entry) => entry,
                None => match self.merge.next_entry(grid)? {
                    Some(entry) => {
                        work += 1;
                        self.consumed += 1;
                        if !self.retention.keep(&entry, manifest, self.target) {
                            continue;
                        }
                        entry
                    }
                    None => {
                        self.finish_output(grid)?;
                        return Ok(StepOutcome { work, done: true });
                    }
                },
            };
            if let Err(err) = self.place(grid, &entry, next_table_id, table_entries_max) {
                self.pending = Some(entry);
                return Err(err);
            }
        }
        Ok(StepOutcome { work, done: false })
    }

    /// Add an entry to the current output, starting a new table at a key
    /// boundary when the current one is full
    fn place<S: Storage>(
        &mut self,
        grid: &mut Grid<S>,
        entry: &Entry,
        next_table_id: &mut u64,
        table_entries_max: usize,
    ) -> Result<()> {
        let last_key = self.builder.as_ref().and_then(|b| b.last_key());
        let starts_key = last_key != Some(entry.key.as_slice());
        if starts_key {
            if let Some(builder) = self.builder.as_mut() {
                if builder.should_finish(entry.key.len(), table_entries_max) {
                    let table = builder.finish(grid)?;
                    self.outputs.push(table);
                    self.builder = None;
                }
            }
        }
        let block_size = grid.block_size();
        let builder = self.builder.get_or_insert_with(|| {
            let builder = TableBuilder::new(*next_table_id, block_size);
            *next_table_id += 1;
            builder
        });
        builder.add(grid, entry)
    }

    fn finish_output<S: Storage>(&mut self, grid: &mut Grid<S>) -> Result<()> {
        if let Some(builder) = self.builder.as_mut() {
            if !builder.is_empty() {
                let table = builder.finish(grid)?;
                self.outputs.push(table);
            }
        }
        self.builder = None;
        Ok(())
    }
}
