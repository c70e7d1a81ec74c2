//! Journal Module
//!
//! Write-ahead log of committed operations not yet captured by a
//! superblock checkpoint.
//!
//! ## Responsibilities
//! - Append one record per op, durable before the op is acknowledged
//! - CRC32 checksums over header and body
//! - Parent chaining: each header names the header checksum of op - 1
//! - Replay from the last checkpoint, stopping at the torn-write boundary
//!
//! ## Ring Format
//! The journal zone is a fixed ring of `slot_count` slots; op `n` lives in
//! slot `n % slot_count`. A slot may only be overwritten once a checkpoint
//! at or past its op is durable.
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ Slot (journal_slot_size bytes)                            │
//! │ ┌──────────┬───────────┬────────┬──────────┬────────────┐ │
//! │ │ CRC (4)  │ Body CRC  │ Op (8) │ Size (4) │ Command(1) │ │
//! │ │ hdr 4..32│ (4)       │        │ body len │ + 3 pad    │ │
//! │ ├──────────┴───────────┴────────┴──────────┴────────────┤ │
//! │ │ Parent (4): header CRC of op - 1      │ reserved (4)  │ │
//! │ ├───────────────────────────────────────┴───────────────┤ │
//! │ │ Body: bincode-encoded Command (Size bytes)            │ │
//! │ └───────────────────────────────────────────────────────┘ │
//! └───────────────────────────────────────────────────────────┘
//! ```

mod command;
mod header;
mod recovery;
mod ring;

pub use command::{Command, CommandTag, Mutation, TreeId};
pub use header::RecordHeader;
pub use recovery::{recover, Entry, InvalidRecord, Recovered, RecoveryReport, RecoveryStop};
pub use ring::Journal;

/// Fixed record header bytes at the start of every slot
pub const HEADER_SIZE: usize = 32;
