//! Tree: buffers, levels and paced compaction of one logical table

use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{LsmConfig, TreeSpec};
use crate::error::{Result, StoreError};
use crate::forest::Grid;
use crate::journal::TreeId;
use crate::manifest::{Manifest, ManifestEvent, TableInfo};
use crate::storage::Storage;

use super::buffer::{Buffer, Frozen};
use super::compaction::{Job, JobKind};
use super::merge::{LevelSource, Merge, Source};
use super::scan::{Scan, ScanCursor};
use super::table;

/// Counters describing the shape of a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStats {
    pub tree: TreeId,
    pub buffer_entries: usize,
    pub immutable_entries: usize,
    /// Index 0 is level 1
    pub tables_per_level: Vec<usize>,
    pub compacting: bool,
    pub snapshot_floor: u64,
}

impl TreeStats {
    pub fn total_tables(&self) -> usize {
        self.tables_per_level.iter().sum()
    }
}

enum Selected {
    Job(Job),
    /// A table moved down a level without rewriting
    Moved,
    Idle,
}

/// One LSM tree
pub struct Tree {
    id: TreeId,
    name: String,
    config: LsmConfig,

    mutable: Buffer,
    immutable: Option<Arc<Frozen>>,
    manifest: Manifest,
    job: Option<Job>,

    /// Versions at or below this op collapse to the newest during merges
    snapshot_floor: u64,
    /// Highest op written, for the monotonic op check
    op_last: u64,
    next_table_id: u64,
    /// Manifest events not yet handed to the manifest log
    events: Vec<ManifestEvent>,
}

impl Tree {
    pub fn new(spec: &TreeSpec, config: LsmConfig) -> Self {
        Self {
            id: spec.id,
            name: spec.name.clone(),
            manifest: Manifest::new(spec.id, config.levels),
            config,
            mutable: Buffer::new(),
            immutable: None,
            job: None,
            snapshot_floor: 0,
            op_last: 0,
            next_table_id: ((spec.id as u64) << 48) | 1,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Replay one manifest event during open
    pub fn apply_manifest(&mut self, event: &ManifestEvent) -> Result<()> {
        self.manifest.apply(event)?;
        if let ManifestEvent::Insert { table, .. } = event {
            self.next_table_id = self.next_table_id.max(table.id + 1);
        }
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Refuse `count` more writes while the buffer is full and the previous
    /// one is still being flushed
    pub fn admit(&self, count: usize) -> Result<()> {
        if self.immutable.is_some() && self.mutable.len() + count > self.config.buffer_entries_max
        {
            return Err(StoreError::CompactionBacklog { tree: self.id });
        }
        Ok(())
    }

    pub fn put(&mut self, op: u64, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.write(op, key, Some(value))
    }

    pub fn remove(&mut self, op: u64, key: Vec<u8>) -> Result<()> {
        self.write(op, key, None)
    }

    fn write(&mut self, op: u64, key: Vec<u8>, value: Option<Vec<u8>>) -> Result<()> {
        if op < self.op_last {
            return Err(StoreError::OpOrder {
                expected: self.op_last,
                got: op,
            });
        }
        self.op_last = op;
        self.mutable.insert(key, op, value);
        if self.mutable.len() >= self.config.buffer_entries_max && self.immutable.is_none() {
            self.freeze();
        }
        Ok(())
    }

    fn freeze(&mut self) {
        if self.mutable.is_empty() || self.immutable.is_some() {
            return;
        }
        let buffer = std::mem::take(&mut self.mutable);
        let run = buffer.freeze();
        debug!(tree = self.id, entries = run.len(), "buffer frozen");
        self.immutable = Some(Arc::new(run));
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Value of `key` as of `snapshot`; `None` if absent or removed
    pub fn get<S: Storage>(
        &self,
        grid: &Grid<S>,
        key: &[u8],
        snapshot: u64,
    ) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.mutable.get(key, snapshot) {
            return Ok(entry.value);
        }
        if let Some(run) = &self.immutable {
            if let Some(entry) = run.get(key, snapshot) {
                return Ok(entry.value);
            }
        }
        for level in 1..=self.manifest.level_count() {
            if let Some(info) = self.manifest.find(level, key) {
                if let Some(entry) = table::get(grid, info, key, snapshot)? {
                    return Ok(entry.value);
                }
            }
        }
        Ok(None)
    }

    /// Lazy scan of `range` as of `snapshot`
    pub fn scan<'a, S: Storage, R: RangeBounds<Vec<u8>>>(
        &'a self,
        grid: &'a Grid<S>,
        range: R,
        snapshot: u64,
    ) -> Scan<'a, S> {
        let cursor = ScanCursor::new(
            range.start_bound().cloned(),
            range.end_bound().cloned(),
            snapshot,
        );
        self.resume(grid, cursor)
    }

    /// Continue a scan from a saved cursor
    pub fn resume<'a, S: Storage>(
        &'a self,
        grid: &'a Grid<S>,
        cursor: ScanCursor,
    ) -> Scan<'a, S> {
        let mut sources = Vec::new();
        if !cursor.exhausted {
            let start = match &cursor.start {
                Bound::Included(key) => Bound::Included(key.as_slice()),
                Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
                Bound::Unbounded => Bound::Unbounded,
            };
            sources.push(Source::Buffer(Box::new(self.mutable.range(start))));
            if let Some(run) = &self.immutable {
                sources.push(Source::Frozen {
                    run: Arc::clone(run),
                    position: run.position(start),
                });
            }
            for level in 1..=self.manifest.level_count() {
                let tables = self.scan_tables(level, &cursor);
                if !tables.is_empty() {
                    sources.push(Source::Level(LevelSource::new(tables, cursor.start.clone())));
                }
            }
        }
        Scan::new(grid, Merge::new(sources), cursor)
    }

    fn scan_tables(&self, level: u8, cursor: &ScanCursor) -> Vec<TableInfo> {
        let tables: Box<dyn Iterator<Item = &TableInfo> + '_> = match &cursor.start {
            Bound::Included(key) | Bound::Excluded(key) => {
                Box::new(self.manifest.tables_from(level, key))
            }
            Bound::Unbounded => Box::new(self.manifest.tables(level)),
        };
        tables
            .take_while(|table| cursor.before_end(&table.key_min))
            .cloned()
            .collect()
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Tables level `level` may hold before it is compacted down
    pub fn capacity(&self, level: u8) -> usize {
        (self.config.growth_factor as usize).saturating_pow(level as u32)
    }

    /// Outstanding merge work, used to weight the shared budget
    pub fn debt(&self) -> usize {
        let mut debt = self.immutable.as_ref().map_or(0, |run| run.len());
        if self.job.is_some() {
            debt += 1;
        }
        for level in 1..self.manifest.level_count() {
            let excess = self
                .manifest
                .table_count(level)
                .saturating_sub(self.capacity(level));
            debt += excess * self.config.table_entries_max;
        }
        debt
    }

    /// Nothing buffered, nothing in flight, no level over capacity
    pub fn is_idle(&self) -> bool {
        self.mutable.is_empty() && self.immutable.is_none() && self.debt() == 0
    }

    /// Perform up to `budget` entries of merge work
    pub fn compact_step<S: Storage>(
        &mut self,
        grid: &mut Grid<S>,
        budget: usize,
    ) -> Result<usize> {
        self.drive(grid, budget, true)
    }

    /// Flush every buffer and compact until no level is over capacity
    pub fn compact<S: Storage>(&mut self, grid: &mut Grid<S>) -> Result<()> {
        loop {
            self.freeze();
            self.drive(grid, usize::MAX, true)?;
            if self.is_idle() {
                return Ok(());
            }
        }
    }

    /// Finish the running job and flush every buffer into level 1
    ///
    /// Leaves level merges for later; a checkpoint only needs the buffers
    /// on disk.
    pub fn flush_all<S: Storage>(&mut self, grid: &mut Grid<S>) -> Result<()> {
        loop {
            self.freeze();
            if self.job.is_none() && self.immutable.is_none() {
                return Ok(());
            }
            self.drive(grid, usize::MAX, false)?;
        }
    }

    fn drive<S: Storage>(
        &mut self,
        grid: &mut Grid<S>,
        budget: usize,
        levels: bool,
    ) -> Result<usize> {
        let mut work = 0;
        while work < budget {
            if self.job.is_none() {
                match self.select(levels)? {
                    Selected::Job(job) => self.job = Some(job),
                    Selected::Moved => {
                        work += 1;
                        continue;
                    }
                    Selected::Idle => break,
                }
            }
            let outcome = match self.job.as_mut() {
                Some(job) => job.step(
                    grid,
                    &self.manifest,
                    budget - work,
                    &mut self.next_table_id,
                    self.config.table_entries_max,
                )?,
                None => break,
            };
            work += outcome.work;
            if outcome.done {
                if let Some(job) = self.job.take() {
                    self.commit(grid, job)?;
                }
            }
        }
        Ok(work)
    }

    fn select(&mut self, levels: bool) -> Result<Selected> {
        if let Some(run) = self.immutable.clone() {
            let overlap = match (run.key_min(), run.key_max()) {
                (Some(min), Some(max)) => self
                    .manifest
                    .overlapping(1, min, max)?
                    .into_iter()
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
            debug!(
                tree = self.id,
                entries = run.len(),
                overlap = overlap.len(),
                "flush started"
            );
            return Ok(Selected::Job(Job::flush(run, overlap, self.snapshot_floor)));
        }
        if !levels {
            return Ok(Selected::Idle);
        }

        for level in 1..self.manifest.level_count() {
            if self.manifest.table_count(level) <= self.capacity(level) {
                continue;
            }
            let mut best: Option<(usize, &TableInfo)> = None;
            for candidate in self.manifest.tables(level) {
                let overlap = self
                    .manifest
                    .overlapping(level + 1, &candidate.key_min, &candidate.key_max)?
                    .len();
                if best.map_or(true, |(least, _)| overlap < least) {
                    best = Some((overlap, candidate));
                }
            }
            let table = match best {
                Some((_, table)) => table.clone(),
                None => continue,
            };
            let overlap: Vec<TableInfo> = self
                .manifest
                .overlapping(level + 1, &table.key_min, &table.key_max)?
                .into_iter()
                .cloned()
                .collect();
            if overlap.is_empty() {
                self.move_table(level, table)?;
                return Ok(Selected::Moved);
            }
            debug!(
                tree = self.id,
                level,
                table = table.id,
                overlap = overlap.len(),
                "compaction started"
            );
            return Ok(Selected::Job(Job::merge(
                level,
                table,
                overlap,
                self.snapshot_floor,
            )));
        }
        Ok(Selected::Idle)
    }

    fn move_table(&mut self, level: u8, table: TableInfo) -> Result<()> {
        self.manifest.remove(level, &table)?;
        self.manifest.insert(level + 1, table.clone())?;
        debug!(tree = self.id, level, table = table.id, "table moved down");
        self.events.push(ManifestEvent::Remove {
            tree: self.id,
            level,
            table: table.clone(),
        });
        self.events.push(ManifestEvent::Insert {
            tree: self.id,
            level: level + 1,
            table,
        });
        Ok(())
    }

    fn commit<S: Storage>(&mut self, grid: &mut Grid<S>, job: Job) -> Result<()> {
        for (level, table) in &job.inputs {
            self.manifest.remove(*level, table)?;
            for address in &table.addresses {
                grid.release(*address)?;
            }
            self.events.push(ManifestEvent::Remove {
                tree: self.id,
                level: *level,
                table: table.clone(),
            });
        }
        for table in &job.outputs {
            self.manifest.insert(job.target, table.clone())?;
            self.events.push(ManifestEvent::Insert {
                tree: self.id,
                level: job.target,
                table: table.clone(),
            });
        }
        if job.kind == JobKind::Flush {
            self.immutable = None;
        }
        info!(
            tree = self.id,
            kind = ?job.kind,
            target = job.target,
            inputs = job.inputs.len(),
            outputs = job.outputs.len(),
            entries = job.consumed,
            "compaction committed"
        );
        Ok(())
    }

    // =========================================================================
    // Bookkeeping
    // =========================================================================

    /// Manifest events produced since the last call
    pub fn take_events(&mut self) -> Vec<ManifestEvent> {
        std::mem::take(&mut self.events)
    }

    /// Events not yet taken, oldest first
    pub fn pending_events(&self) -> &[ManifestEvent] {
        &self.events
    }

    /// Put back events that were taken but not logged, ahead of newer ones
    pub fn restore_events(&mut self, mut events: Vec<ManifestEvent>) {
        events.append(&mut self.events);
        self.events = events;
    }

    pub fn snapshot_floor(&self) -> u64 {
        self.snapshot_floor
    }

    /// Versions at or below `op` may be collapsed by later merges
    pub fn set_snapshot_floor(&mut self, op: u64) {
        self.snapshot_floor = op;
    }

    pub fn op_last(&self) -> u64 {
        self.op_last
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            tree: self.id,
            buffer_entries: self.mutable.len(),
            immutable_entries: self.immutable.as_ref().map_or(0, |run| run.len()),
            tables_per_level: (1..=self.manifest.level_count())
                .map(|level| self.manifest.table_count(level))
                .collect(),
            compacting: self.job.is_some(),
            snapshot_floor: self.snapshot_floor,
        }
    }
}
