//! Engine Module
//!
//! The storage instance handed to the replication layer.
//!
//! ## Responsibilities
//! - Format a device and recover it on startup
//! - Journal each committed op before applying it to the forest
//! - Charge paced compaction work per op and refuse writes while it lags
//! - Capture checkpoints into the superblock
//!
//! ## Recovery
//! ```text
//! ReadSuperblock ──► LoadForest ──► ReplayJournal ──► Ready
//!   highest valid     manifest log     records after
//!   local slot        + free set       the checkpoint op
//! ```
//! Each step either advances or fails with the error that stopped it. A
//! torn or corrupt journal tail ends replay at the last valid record; a
//! manifest or free set that disagrees with the superblock halts recovery.

use std::ops::RangeBounds;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::forest::Forest;
use crate::journal::{Command, Journal, Mutation, RecoveryReport, TreeId};
use crate::lsm::{Scan, ScanCursor, TreeStats};
use crate::storage::{FileStorage, Layout, QueuedStorage, Storage};
use crate::superblock::{SuperBlock, VsrState};

/// Steps of the startup state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    ReadSuperblock,
    LoadForest,
    ReplayJournal,
    Ready,
}

/// The storage engine
///
/// ## Concurrency Model: single owner
///
/// One logical thread of control mutates the superblock, the free set and
/// the manifest log, so every mutating method takes `&mut self` and there is
/// no internal locking. Device writes may still be queued asynchronously
/// beneath (see `QueuedStorage`); every durability point is a `sync`.
pub struct Engine<S: Storage> {
    config: Config,
    superblock: SuperBlock<S>,
    journal: Journal<S>,
    forest: Forest<S>,
    /// Last op applied to the forest
    commit_op: u64,
    /// How journal replay ended at open
    recovery: Option<RecoveryReport>,
}

impl<S: Storage> Engine<S> {
    /// Write an empty instance to `storage`
    ///
    /// The superblock is written last; a device whose format was cut short
    /// has no valid slot and fails to open.
    pub fn format(config: Config, storage: S) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();
        Self::check_device(&storage, &layout)?;

        let journal = Journal::format(storage.clone(), layout.clone())?;
        let forest = Forest::format(storage.clone(), layout.clone(), &config);
        let vsr = VsrState {
            cluster: config.cluster,
            replica: config.replica,
            replica_count: config.replica_count,
            ..VsrState::default()
        };
        let superblock = SuperBlock::format(storage, layout, vsr)?;

        info!(
            cluster = config.cluster,
            replica = config.replica,
            trees = config.trees.len(),
            "engine formatted"
        );
        Ok(Self {
            config,
            superblock,
            journal,
            forest,
            commit_op: 0,
            recovery: None,
        })
    }

    /// Recover an instance from `storage`
    pub fn open(config: Config, storage: S) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();
        Self::check_device(&storage, &layout)?;

        let mut state = RecoveryState::ReadSuperblock;
        let mut superblock = None;
        let mut forest = None;
        let mut engine = None;
        loop {
            debug!(?state, "recovery step");
            state = match state {
                RecoveryState::ReadSuperblock => {
                    let opened = SuperBlock::open(storage.clone(), layout.clone())?;
                    Self::check_identity(&config, opened.working().vsr)?;
                    superblock = Some(opened);
                    RecoveryState::LoadForest
                }
                RecoveryState::LoadForest => {
                    let root = superblock.as_ref().ok_or_else(|| missing("superblock"))?;
                    forest = Some(Forest::open(
                        storage.clone(),
                        layout.clone(),
                        &config,
                        root.working(),
                    )?);
                    RecoveryState::ReplayJournal
                }
                RecoveryState::ReplayJournal => {
                    let root = superblock.take().ok_or_else(|| missing("superblock"))?;
                    let loaded = forest.take().ok_or_else(|| missing("forest"))?;
                    engine = Some(Self::replay(
                        config.clone(),
                        storage.clone(),
                        layout.clone(),
                        root,
                        loaded,
                    )?);
                    RecoveryState::Ready
                }
                RecoveryState::Ready => {
                    let ready: Self = engine.take().ok_or_else(|| missing("engine"))?;
                    info!(
                        durable_op = ready.durable_op(),
                        commit_op = ready.commit_op,
                        tables = ready.forest.table_count(),
                        "engine ready"
                    );
                    return Ok(ready);
                }
            };
        }
    }

    fn replay(
        config: Config,
        storage: S,
        layout: Layout,
        superblock: SuperBlock<S>,
        mut forest: Forest<S>,
    ) -> Result<Self> {
        let checkpoint_op = superblock.working().checkpoint_op();
        let (journal, recovered) = Journal::open(storage, layout, checkpoint_op)?;
        if let Some(err) = recovered.report.stop.error() {
            warn!(
                checkpoint_op,
                last_op = recovered.report.last_op,
                error = %err,
                "journal tail discarded"
            );
        }

        let budget = config.lsm.compaction_work_per_op;
        for entry in &recovered.entries {
            let mutations = entry.command.mutations();
            Self::make_room(&mut forest, &mutations, budget)?;
            forest.apply(entry.op, &mutations)?;
            forest.compact_beat(budget * mutations.len().max(1))?;
        }
        info!(
            checkpoint_op,
            replayed = recovered.report.entries_recovered,
            commit_op = recovered.report.last_op,
            "journal replayed"
        );

        Ok(Self {
            config,
            superblock,
            journal,
            forest,
            commit_op: recovered.report.last_op,
            recovery: Some(recovered.report),
        })
    }

    /// Replayed ops were admitted before the crash; drive compaction until
    /// the forest takes them again
    fn make_room(forest: &mut Forest<S>, mutations: &[Mutation], budget: usize) -> Result<()> {
        loop {
            match forest.admit(mutations) {
                Err(StoreError::CompactionBacklog { tree }) => {
                    if forest.compact_beat(budget)? == 0 {
                        return Err(StoreError::CompactionBacklog { tree });
                    }
                }
                other => return other,
            }
        }
    }

    fn check_device(storage: &S, layout: &Layout) -> Result<()> {
        if storage.size() < layout.total_size() {
            return Err(StoreError::Config(format!(
                "device of {} bytes is smaller than the layout ({} bytes)",
                storage.size(),
                layout.total_size()
            )));
        }
        Ok(())
    }

    fn check_identity(config: &Config, vsr: VsrState) -> Result<()> {
        if vsr.cluster != config.cluster || vsr.replica != config.replica {
            return Err(StoreError::Config(format!(
                "data file belongs to cluster {} replica {}, configured for cluster {} replica {}",
                vsr.cluster, vsr.replica, config.cluster, config.replica
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Replication Interface
    // =========================================================================

    /// Journal and apply committed `op`
    ///
    /// `op` must follow `commit_op`. Paced compaction for the op runs first;
    /// if a tree is still too far behind the op is refused with
    /// `CompactionBacklog` before anything is journaled.
    pub fn apply(&mut self, op: u64, command: &Command) -> Result<()> {
        if op != self.commit_op + 1 {
            return Err(StoreError::OpOrder {
                expected: self.commit_op + 1,
                got: op,
            });
        }
        let mutations = command.mutations();
        let budget = self.config.lsm.compaction_work_per_op * mutations.len().max(1);
        self.forest.compact_beat(budget)?;
        self.forest.admit(&mutations)?;

        self.journal.append(op, command)?;
        self.forest.apply(op, &mutations)?;
        self.commit_op = op;
        Ok(())
    }

    /// Capture everything up to `op` in a new superblock
    ///
    /// `op` must equal `commit_op`. On return the checkpoint is durable and
    /// the journal slots up to `op` are free for reuse.
    pub fn checkpoint(&mut self, op: u64) -> Result<()> {
        if op != self.commit_op {
            return Err(StoreError::OpOrder {
                expected: self.commit_op,
                got: op,
            });
        }
        let checkpoint = self.forest.checkpoint(op)?;
        let previous = self.superblock.working().vsr;
        let vsr = VsrState {
            commit_min: op,
            commit_max: previous.commit_max.max(op),
            ..previous
        };
        self.superblock
            .checkpoint(vsr, checkpoint.manifest, checkpoint.free_set.clone())?;
        self.forest.checkpoint_durable(&checkpoint);
        self.journal.checkpoint(op)?;

        info!(
            op,
            sequence = self.superblock.working().sequence,
            manifest_half = checkpoint.manifest.half,
            blocks = self.forest.grid().free_set().acquired_count(),
            "checkpoint durable"
        );
        Ok(())
    }

    /// Persist a new view without moving the checkpoint
    pub fn view_change(&mut self, view: u32, log_view: u32) -> Result<()> {
        self.superblock.view_change(view, log_view, self.commit_op)
    }

    /// Op captured by the durable superblock
    pub fn durable_op(&self) -> u64 {
        self.superblock.working().checkpoint_op()
    }

    pub fn commit_op(&self) -> u64 {
        self.commit_op
    }

    /// One compaction beat outside of `apply`
    pub fn tick(&mut self) -> Result<usize> {
        self.forest.compact_beat(self.config.lsm.compaction_work_per_op)
    }

    /// Drive every tree to quiescence
    pub fn compact(&mut self) -> Result<()> {
        self.forest.compact_all()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Latest committed value of `key`
    pub fn get(&self, tree: TreeId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.forest.get(tree, key, self.commit_op)
    }

    /// Value of `key` as of `snapshot`
    pub fn get_at(&self, tree: TreeId, key: &[u8], snapshot: u64) -> Result<Option<Vec<u8>>> {
        self.forest.get(tree, key, snapshot)
    }

    /// Lazy scan of `range` as of the latest committed op
    pub fn scan<R: RangeBounds<Vec<u8>>>(&self, tree: TreeId, range: R) -> Result<Scan<'_, S>> {
        self.forest.scan(tree, range, self.commit_op)
    }

    pub fn scan_at<R: RangeBounds<Vec<u8>>>(
        &self,
        tree: TreeId,
        range: R,
        snapshot: u64,
    ) -> Result<Scan<'_, S>> {
        self.forest.scan(tree, range, snapshot)
    }

    /// Continue a scan saved with `Scan::cursor`
    pub fn resume(&self, tree: TreeId, cursor: ScanCursor) -> Result<Scan<'_, S>> {
        self.forest.resume(tree, cursor)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn superblock(&self) -> &SuperBlock<S> {
        &self.superblock
    }

    pub fn journal(&self) -> &Journal<S> {
        &self.journal
    }

    pub fn forest(&self) -> &Forest<S> {
        &self.forest
    }

    /// How journal replay ended; `None` for a freshly formatted engine
    pub fn recovery(&self) -> Option<&RecoveryReport> {
        self.recovery.as_ref()
    }

    pub fn stats(&self) -> Vec<TreeStats> {
        self.forest.stats()
    }

    /// Check manifest and free-set consistency
    pub fn verify(&self) -> Result<()> {
        self.forest.verify()
    }
}

impl Engine<QueuedStorage<FileStorage>> {
    /// Create `config.data_path` and format it
    pub fn format_path(config: Config) -> Result<Self> {
        let size = config.layout().total_size();
        let file = FileStorage::create(&config.data_path, size)?;
        let depth = config.io_depth;
        Self::format(config, QueuedStorage::new(file, depth))
    }

    /// Recover the instance stored at `config.data_path`
    pub fn open_path(config: Config) -> Result<Self> {
        let size = config.layout().total_size();
        let file = FileStorage::open(&config.data_path, size)?;
        let depth = config.io_depth;
        Self::open(config, QueuedStorage::new(file, depth))
    }
}

fn missing(what: &str) -> StoreError {
    StoreError::Corruption(format!("recovery reached a step without its {}", what))
}
