//! Configuration for ledgerstore
//!
//! Centralized configuration with sensible defaults. The geometry fields
//! (slot sizes, zone sizes, block count) are fixed at format time; opening
//! an existing data file with a different geometry is a configuration error.

use std::path::PathBuf;

use crate::error::{Result, StoreError};
use crate::ewah;
use crate::journal::HEADER_SIZE as JOURNAL_HEADER_SIZE;
use crate::storage::Layout;
use crate::superblock::HEADER_SIZE as SUPERBLOCK_HEADER_SIZE;

/// Main configuration for a storage instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Device Configuration
    // -------------------------------------------------------------------------
    /// Data file used by `Engine::open_path`
    pub data_path: PathBuf,

    /// Max writes in flight for the queued device backend
    pub io_depth: usize,

    // -------------------------------------------------------------------------
    // Cluster Configuration
    // -------------------------------------------------------------------------
    pub cluster: u128,
    pub replica: u8,
    pub replica_count: u8,

    // -------------------------------------------------------------------------
    // Superblock Configuration
    // -------------------------------------------------------------------------
    /// Number of rotating superblock slots
    pub superblock_copies: u8,

    /// Bytes per superblock slot (header + free-set trailer)
    pub superblock_slot_size: u64,

    // -------------------------------------------------------------------------
    // Journal Configuration
    // -------------------------------------------------------------------------
    /// Ops the journal ring can hold past the last checkpoint
    pub journal_slot_count: u64,

    /// Bytes per journal slot (header + body)
    pub journal_slot_size: u64,

    // -------------------------------------------------------------------------
    // Manifest / Grid Configuration
    // -------------------------------------------------------------------------
    /// Bytes reserved for the manifest log (split into two halves)
    pub manifest_zone_size: u64,

    /// Bytes per grid block
    pub block_size: u64,

    /// Number of grid blocks
    pub grid_block_count: u64,

    // -------------------------------------------------------------------------
    // LSM Configuration
    // -------------------------------------------------------------------------
    pub lsm: LsmConfig,

    /// The fixed set of trees owned by the forest
    pub trees: Vec<TreeSpec>,
}

/// Tuning for every LSM tree in the forest
#[derive(Debug, Clone)]
pub struct LsmConfig {
    /// Number of on-disk levels (level 1..=levels)
    pub levels: u8,

    /// Level L holds at most growth_factor^L tables before it compacts
    pub growth_factor: u32,

    /// Entries in the mutable buffer before it is frozen
    pub buffer_entries_max: usize,

    /// Entries per output table
    pub table_entries_max: usize,

    /// Merge work (entries) charged per logical write
    pub compaction_work_per_op: usize,
}

/// A named tree in the forest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSpec {
    pub id: u16,
    pub name: String,
}

impl TreeSpec {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl Default for LsmConfig {
    fn default() -> Self {
        Self {
            levels: 7,
            growth_factor: 8,
            buffer_entries_max: 8 * 1024,
            table_entries_max: 8 * 1024,
            compaction_work_per_op: 64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./ledgerstore.data"),
            io_depth: 32,
            cluster: 0,
            replica: 0,
            replica_count: 1,
            superblock_copies: 4,
            superblock_slot_size: 64 * 1024,
            journal_slot_count: 1024,
            journal_slot_size: 4 * 1024,
            manifest_zone_size: 4 * 1024 * 1024,
            block_size: 64 * 1024,
            grid_block_count: 4096, // 256 MB
            lsm: LsmConfig::default(),
            trees: vec![
                TreeSpec::new(1, "accounts"),
                TreeSpec::new(2, "transfers"),
                TreeSpec::new(3, "transfers_pending"),
            ],
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Zone layout of the data file
    pub fn layout(&self) -> Layout {
        Layout::new(self)
    }

    /// Reject geometry that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.replica_count == 0 || self.replica >= self.replica_count {
            return Err(StoreError::Config(format!(
                "replica {} out of range for replica_count {}",
                self.replica, self.replica_count
            )));
        }
        if self.superblock_copies < 2 {
            return Err(StoreError::Config(
                "superblock_copies must be at least 2".to_string(),
            ));
        }
        let free_set_words = ewah::max_encoded_words(self.grid_block_count as usize) as u64;
        let worst_case = SUPERBLOCK_HEADER_SIZE as u64 + 8 * free_set_words;
        if self.superblock_slot_size < worst_case {
            return Err(StoreError::Config(format!(
                "superblock_slot_size {} cannot hold a free set of {} blocks (needs {})",
                self.superblock_slot_size, self.grid_block_count, worst_case
            )));
        }
        if self.journal_slot_count == 0 || self.journal_slot_size <= JOURNAL_HEADER_SIZE as u64 {
            return Err(StoreError::Config(
                "journal slots must be larger than the record header".to_string(),
            ));
        }
        if self.manifest_zone_size < 2 * 4096 || self.manifest_zone_size % 2 != 0 {
            return Err(StoreError::Config(
                "manifest_zone_size must be even and at least 8 KiB".to_string(),
            ));
        }
        if self.block_size < 512 || self.grid_block_count == 0 {
            return Err(StoreError::Config(
                "grid needs at least one block of 512 bytes or more".to_string(),
            ));
        }
        if self.lsm.levels == 0 || self.lsm.growth_factor < 2 {
            return Err(StoreError::Config(
                "lsm needs at least one level and growth_factor >= 2".to_string(),
            ));
        }
        if self.lsm.buffer_entries_max == 0
            || self.lsm.table_entries_max == 0
            || self.lsm.compaction_work_per_op == 0
        {
            return Err(StoreError::Config(
                "lsm buffer, table and pacing sizes must be non-zero".to_string(),
            ));
        }
        if self.trees.is_empty() {
            return Err(StoreError::Config("forest needs at least one tree".to_string()));
        }
        let mut ids: Vec<u16> = self.trees.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.trees.len() {
            return Err(StoreError::Config("tree ids must be unique".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data file path
    pub fn data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_path = path.into();
        self
    }

    pub fn io_depth(mut self, depth: usize) -> Self {
        self.config.io_depth = depth;
        self
    }

    /// Set cluster identity and this replica's position in it
    pub fn cluster(mut self, cluster: u128, replica: u8, replica_count: u8) -> Self {
        self.config.cluster = cluster;
        self.config.replica = replica;
        self.config.replica_count = replica_count;
        self
    }

    pub fn superblock_copies(mut self, copies: u8) -> Self {
        self.config.superblock_copies = copies;
        self
    }

    pub fn superblock_slot_size(mut self, size: u64) -> Self {
        self.config.superblock_slot_size = size;
        self
    }

    pub fn journal_slot_count(mut self, count: u64) -> Self {
        self.config.journal_slot_count = count;
        self
    }

    pub fn journal_slot_size(mut self, size: u64) -> Self {
        self.config.journal_slot_size = size;
        self
    }

    pub fn manifest_zone_size(mut self, size: u64) -> Self {
        self.config.manifest_zone_size = size;
        self
    }

    pub fn block_size(mut self, size: u64) -> Self {
        self.config.block_size = size;
        self
    }

    pub fn grid_block_count(mut self, count: u64) -> Self {
        self.config.grid_block_count = count;
        self
    }

    pub fn lsm(mut self, lsm: LsmConfig) -> Self {
        self.config.lsm = lsm;
        self
    }

    pub fn buffer_entries_max(mut self, entries: usize) -> Self {
        self.config.lsm.buffer_entries_max = entries;
        self
    }

    pub fn table_entries_max(mut self, entries: usize) -> Self {
        self.config.lsm.table_entries_max = entries;
        self
    }

    pub fn compaction_work_per_op(mut self, entries: usize) -> Self {
        self.config.lsm.compaction_work_per_op = entries;
        self
    }

    pub fn trees(mut self, trees: Vec<TreeSpec>) -> Self {
        self.config.trees = trees;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
