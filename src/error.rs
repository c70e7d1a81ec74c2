//! Error types for ledgerstore
//!
//! Provides a unified error type for all operations. Checksum and framing
//! errors are structured so the recovery orchestration in the engine can
//! decide between falling back to an earlier unit and halting.

use std::fmt;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// The durable unit an integrity error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    SuperblockSlot,
    JournalRecord,
    ManifestRecord,
    TableBlock,
    Table,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Unit::SuperblockSlot => "superblock slot",
            Unit::JournalRecord => "journal record",
            Unit::ManifestRecord => "manifest record",
            Unit::TableBlock => "table block",
            Unit::Table => "table",
        };
        f.write_str(name)
    }
}

/// Which resource ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    /// No free block now, but blocks are staged for release at the next
    /// checkpoint. Transient.
    GridBacklog { staged: u64 },
    /// Every grid block is referenced by live state.
    GridFull,
    /// The journal ring holds `slot_count` ops past the last checkpoint.
    JournalFull { checkpoint_op: u64 },
    /// The active manifest half cannot take another record.
    ManifestFull,
}

impl Exhausted {
    /// True when progress (compaction or a checkpoint) can free the resource
    pub fn is_transient(&self) -> bool {
        !matches!(self, Exhausted::GridFull)
    }
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exhausted::GridBacklog { staged } => {
                write!(f, "grid backlog ({} blocks staged for release)", staged)
            }
            Exhausted::GridFull => f.write_str("grid full"),
            Exhausted::JournalFull { checkpoint_op } => {
                write!(f, "journal full (checkpoint op {})", checkpoint_op)
            }
            Exhausted::ManifestFull => f.write_str("manifest log full"),
        }
    }
}

/// Unified error type for ledgerstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The in-memory device stopped accepting writes (simulated crash)
    #[error("Device crashed")]
    Crashed,

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Checksum mismatch in {unit} at offset {offset}")]
    Checksum { unit: Unit, offset: u64 },

    #[error("Torn write in {unit} at offset {offset}: declared {declared} bytes, {available} available")]
    TornWrite {
        unit: Unit,
        offset: u64,
        declared: u64,
        available: u64,
    },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("No quorum of valid state: {0}")]
    QuorumUnrecoverable(String),

    // -------------------------------------------------------------------------
    // Resource Errors
    // -------------------------------------------------------------------------
    #[error("Resource exhausted: {0}")]
    Exhausted(Exhausted),

    #[error("Compaction backlog in tree {tree}: writes paused until paced work catches up")]
    CompactionBacklog { tree: u16 },

    #[error("Entry of {size} bytes does not fit in a block of {limit} bytes")]
    EntryTooLarge { size: usize, limit: usize },

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Op out of order: expected {expected}, got {got}")]
    OpOrder { expected: u64, got: u64 },

    #[error("Unknown tree: {0}")]
    UnknownTree(u16),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl StoreError {
    /// Integrity failures of a single unit: recovery may fall back to the
    /// previous valid unit.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            StoreError::Checksum { .. } | StoreError::TornWrite { .. } | StoreError::Corruption(_)
        )
    }
}
