//! # ledgerstore
//!
//! Crash-safe storage core for a replicated financial ledger:
//! - Superblock with rotating slots and quorum recovery
//! - Journal ring of committed ops, chained by checksum
//! - Manifest log of table inserts and removes, compacted in two halves
//! - A forest of LSM trees sharing one grid of fixed-size blocks
//! - EWAH-compressed free set with releases staged until the next checkpoint
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Replication layer (caller)                  │
//! │            apply(op, command)      checkpoint(op)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                          Engine                             │
//! │      ReadSuperblock → LoadForest → ReplayJournal → Ready    │
//! └──────┬───────────────────┬──────────────────────┬───────────┘
//!        │                   │                      │
//!        ▼                   ▼                      ▼
//! ┌─────────────┐     ┌─────────────┐        ┌─────────────┐
//! │  Journal    │     │   Forest    │        │ Superblock  │
//! │  (ring)     │     │  (LSM trees)│        │ (N slots)   │
//! └─────────────┘     └──────┬──────┘        └─────────────┘
//!                            │
//!                ┌───────────┴───────────┐
//!                ▼                       ▼
//!         ┌─────────────┐         ┌─────────────┐
//!         │ Manifest log│         │ Grid +      │
//!         │ (2 halves)  │         │ Free set    │
//!         └─────────────┘         └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checksum;
pub mod config;
pub mod error;

pub mod ewah;
pub mod segmented;
pub mod storage;

pub mod superblock;
pub mod journal;
pub mod manifest;
pub mod lsm;
pub mod forest;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, LsmConfig, TreeSpec};
pub use engine::{Engine, RecoveryState};
pub use error::{Exhausted, Result, StoreError, Unit};
pub use journal::{Command, Mutation, TreeId};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ledgerstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
