//! Forest Module
//!
//! The fixed set of named LSM trees sharing one grid and one manifest log.
//!
//! ## Ownership
//! ```text
//!                  ┌──────────────────────────────┐
//!   apply(op) ───► │ Forest                       │
//!                  │  trees: accounts, transfers… │──► events ──► ManifestLog
//!   beat(budget) ─►│  round-robin, debt-weighted  │
//!                  └──────────────┬───────────────┘
//!                                 │ blocks
//!                  ┌──────────────▼───────────────┐
//!                  │ Grid = Storage + FreeSet     │
//!                  └──────────────────────────────┘
//! ```
//!
//! ## Checkpoint
//! 1. Flush every buffer into level 1
//! 2. Hand pending manifest events to the log, or compact the log instead
//!    if those events would leave its half more than half full
//! 3. Flush the log and sync the grid
//! 4. Return the manifest pointer and free-set stream for the superblock
//!
//! Once the superblock is durable, `checkpoint_durable` releases staged
//! blocks and lets the log switch halves again.

mod grid;

pub use grid::Grid;

use std::ops::RangeBounds;

use tracing::{debug, info};

use crate::config::{Config, LsmConfig};
use crate::error::{Exhausted, Result, StoreError};
use crate::ewah::BitSet;
use crate::journal::{Mutation, TreeId};
use crate::lsm::{check_entry_fits, Scan, ScanCursor, Tree, TreeStats};
use crate::manifest::{ManifestEvent, ManifestLog};
use crate::storage::{Layout, Storage};
use crate::superblock::{FreeSet, ManifestPointer, SuperBlockHeader};

/// What a forest checkpoint hands to the superblock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForestCheckpoint {
    pub op: u64,
    pub manifest: ManifestPointer,
    pub free_set: Vec<u64>,
}

/// All trees of one storage instance
pub struct Forest<S: Storage> {
    grid: Grid<S>,
    log: ManifestLog<S>,
    /// In configuration order
    trees: Vec<Tree>,
    config: LsmConfig,
    /// Tree served first by the next beat
    cursor: usize,
}

impl<S: Storage> Forest<S> {
    /// An empty forest over a freshly formatted device
    pub fn format(storage: S, layout: Layout, config: &Config) -> Self {
        let free_set = FreeSet::new(layout.block_count);
        Self {
            grid: Grid::new(storage.clone(), layout.clone(), free_set),
            log: ManifestLog::format(storage, layout),
            trees: Self::build_trees(config),
            config: config.lsm.clone(),
            cursor: 0,
        }
    }

    /// Rebuild the forest named by a durable superblock
    pub fn open(
        storage: S,
        layout: Layout,
        config: &Config,
        header: &SuperBlockHeader,
    ) -> Result<Self> {
        if header.free_set_len != layout.block_count {
            return Err(StoreError::Config(format!(
                "data file has {} grid blocks, configuration expects {}",
                header.free_set_len, layout.block_count
            )));
        }
        let free_set = FreeSet::decode(layout.block_count, &header.free_set)?;
        let (log, events) = ManifestLog::open(storage.clone(), layout.clone(), header.manifest)?;

        let mut forest = Self {
            grid: Grid::new(storage, layout, free_set),
            log,
            trees: Self::build_trees(config),
            config: config.lsm.clone(),
            cursor: 0,
        };
        for event in &events {
            forest.tree_mut(event.tree())?.apply_manifest(event)?;
        }
        for tree in &mut forest.trees {
            tree.set_snapshot_floor(header.checkpoint_op());
        }
        forest.verify()?;

        info!(
            trees = forest.trees.len(),
            tables = forest.table_count(),
            blocks = forest.grid.free_set().acquired_count(),
            "forest loaded"
        );
        Ok(forest)
    }

    fn build_trees(config: &Config) -> Vec<Tree> {
        config
            .trees
            .iter()
            .map(|spec| Tree::new(spec, config.lsm.clone()))
            .collect()
    }

    // =========================================================================
    // Trees
    // =========================================================================

    pub fn tree(&self, id: TreeId) -> Result<&Tree> {
        self.trees
            .iter()
            .find(|tree| tree.id() == id)
            .ok_or(StoreError::UnknownTree(id))
    }

    fn tree_mut(&mut self, id: TreeId) -> Result<&mut Tree> {
        self.trees
            .iter_mut()
            .find(|tree| tree.id() == id)
            .ok_or(StoreError::UnknownTree(id))
    }

    pub fn trees(&self) -> impl Iterator<Item = &Tree> + '_ {
        self.trees.iter()
    }

    pub fn grid(&self) -> &Grid<S> {
        &self.grid
    }

    pub fn manifest_log(&self) -> &ManifestLog<S> {
        &self.log
    }

    pub fn table_count(&self) -> usize {
        self.trees
            .iter()
            .map(|tree| tree.manifest().total_tables())
            .sum()
    }

    pub fn stats(&self) -> Vec<TreeStats> {
        self.trees.iter().map(Tree::stats).collect()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Check that every tree touched by `mutations` can take them now
    ///
    /// A version too large for one table block could never be flushed, so
    /// it is refused here rather than after it reaches the journal.
    pub fn admit(&self, mutations: &[Mutation]) -> Result<()> {
        let block_size = self.grid.block_size();
        let mut counts: Vec<(TreeId, usize)> = Vec::new();
        for mutation in mutations {
            let value_len = match mutation {
                Mutation::Upsert { value, .. } => value.len(),
                Mutation::Remove { .. } => 0,
            };
            check_entry_fits(mutation.key().len(), value_len, block_size)?;
            match counts.iter_mut().find(|(tree, _)| *tree == mutation.tree()) {
                Some((_, count)) => *count += 1,
                None => counts.push((mutation.tree(), 1)),
            }
        }
        for (tree, count) in counts {
            self.tree(tree)?.admit(count)?;
        }
        Ok(())
    }

    /// Apply the mutations of committed `op`
    pub fn apply(&mut self, op: u64, mutations: &[Mutation]) -> Result<()> {
        for mutation in mutations {
            self.tree(mutation.tree())?;
        }
        for mutation in mutations {
            match mutation {
                Mutation::Upsert { tree, key, value } => {
                    self.tree_mut(*tree)?.put(op, key.clone(), value.clone())?
                }
                Mutation::Remove { tree, key } => self.tree_mut(*tree)?.remove(op, key.clone())?,
            }
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&self, tree: TreeId, key: &[u8], snapshot: u64) -> Result<Option<Vec<u8>>> {
        self.tree(tree)?.get(&self.grid, key, snapshot)
    }

    pub fn scan<R: RangeBounds<Vec<u8>>>(
        &self,
        tree: TreeId,
        range: R,
        snapshot: u64,
    ) -> Result<Scan<'_, S>> {
        Ok(self.tree(tree)?.scan(&self.grid, range, snapshot))
    }

    pub fn resume(&self, tree: TreeId, cursor: ScanCursor) -> Result<Scan<'_, S>> {
        Ok(self.tree(tree)?.resume(&self.grid, cursor))
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Spend up to `budget` entries of merge work across the trees
    ///
    /// Each tree in debt gets a share proportional to its debt, at least
    /// one entry; the starting tree rotates every beat.
    pub fn compact_beat(&mut self, budget: usize) -> Result<usize> {
        let debts: Vec<usize> = self.trees.iter().map(Tree::debt).collect();
        let total: usize = debts.iter().sum();
        if total == 0 || budget == 0 {
            return Ok(0);
        }

        let count = self.trees.len();
        let mut work = 0;
        for i in 0..count {
            let index = (self.cursor + i) % count;
            if debts[index] == 0 || work >= budget {
                continue;
            }
            let share = (budget as u128 * debts[index] as u128 / total as u128) as usize;
            let share = share.max(1).min(budget - work);
            work += self.trees[index].compact_step(&mut self.grid, share)?;
        }
        self.cursor = (self.cursor + 1) % count;
        self.offer_events()?;
        Ok(work)
    }

    /// Compact every tree until nothing is buffered or over capacity
    pub fn compact_all(&mut self) -> Result<()> {
        for tree in &mut self.trees {
            tree.compact(&mut self.grid)?;
        }
        self.offer_events()
    }

    /// Move pending tree events into the log, oldest first
    ///
    /// On failure the events not yet appended stay with their tree.
    fn drain_events(&mut self) -> Result<()> {
        for tree in &mut self.trees {
            let mut events = tree.take_events();
            for index in 0..events.len() {
                if let Err(err) = self.log.append(&events[index]) {
                    tree.restore_events(events.split_off(index));
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Like `drain_events`, but a full half is not an error between
    /// checkpoints: the events wait in their trees for the next checkpoint,
    /// which compacts the log
    fn offer_events(&mut self) -> Result<()> {
        match self.drain_events() {
            Err(StoreError::Exhausted(Exhausted::ManifestFull)) => {
                debug!(
                    half = self.log.half(),
                    "manifest half full; events held until checkpoint"
                );
                Ok(())
            }
            result => result,
        }
    }

    // =========================================================================
    // Checkpoint
    // =========================================================================

    /// Make the state as of `op` durable on the grid and in the manifest log
    pub fn checkpoint(&mut self, op: u64) -> Result<ForestCheckpoint> {
        for tree in &mut self.trees {
            tree.flush_all(&mut self.grid)?;
        }

        let incoming: u64 = self
            .trees
            .iter()
            .flat_map(|tree| tree.pending_events())
            .map(|event| event.encode().len() as u64)
            .sum();
        if self.log.can_compact() && self.log.wants_compaction_with(incoming) {
            // The live set already reflects every pending event.
            for tree in &mut self.trees {
                tree.take_events();
            }
            let live: Vec<ManifestEvent> = self
                .trees
                .iter()
                .flat_map(|tree| tree.manifest().live_events())
                .collect();
            self.log.compact(&live)?;
        } else {
            self.drain_events()?;
            self.log.flush()?;
        }
        self.grid.sync()?;

        for tree in &mut self.trees {
            tree.set_snapshot_floor(op);
        }
        let checkpoint = ForestCheckpoint {
            op,
            manifest: self.log.pointer(op),
            free_set: self.grid.free_set().encode_checkpoint(),
        };
        debug!(
            op,
            half = checkpoint.manifest.half,
            length = checkpoint.manifest.length,
            free_set_words = checkpoint.free_set.len(),
            "forest checkpoint prepared"
        );
        Ok(checkpoint)
    }

    /// The superblock carrying `checkpoint` is durable
    pub fn checkpoint_durable(&mut self, checkpoint: &ForestCheckpoint) {
        self.grid.free_set_mut().checkpoint_durable();
        self.log.checkpoint_durable(checkpoint.manifest);
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Every live table block is allocated and owned by exactly one table
    pub fn verify(&self) -> Result<()> {
        let block_count = self.grid.free_set().block_count();
        let mut referenced = BitSet::new(block_count as usize);
        for tree in &self.trees {
            tree.manifest().verify()?;
            for (level, table) in tree.manifest().all_tables() {
                for &address in &table.addresses {
                    if address == 0 || address > block_count {
                        return Err(StoreError::Corruption(format!(
                            "tree {} level {} table {} references block {} outside the grid",
                            tree.id(),
                            level,
                            table.id,
                            address
                        )));
                    }
                    let bit = address as usize - 1;
                    if referenced.get(bit) {
                        return Err(StoreError::Corruption(format!(
                            "block {} shared by more than one table (tree {} table {})",
                            address,
                            tree.id(),
                            table.id
                        )));
                    }
                    referenced.set(bit);
                }
            }
        }
        if !self.grid.free_set().covers(&referenced)? {
            return Err(StoreError::Corruption(
                "live table references a block the free set marks free".to_string(),
            ));
        }
        Ok(())
    }
}
