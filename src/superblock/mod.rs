//! Superblock Module
//!
//! The root durable record. Each checkpoint writes a new sequence into the
//! next of N rotating slots; slots are never rewritten in place while they
//! hold the newest valid sequence.
//!
//! ## Slot Format (little-endian)
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │   0 checksum u32 (CRC32 over bytes 4..slot_size)               │
//! │   4 magic "LDGRSUPR" (8)     12 version u16    14 reserved     │
//! │  16 sequence u64             24 parent checksum u32            │
//! │  32 cluster u128                                               │
//! │  48 replica u8  49 replica_count u8              50 reserved   │
//! │  56 view u32                 60 log_view u32                   │
//! │  64 commit_min u64 (checkpoint op)                             │
//! │  72 commit_max u64                                             │
//! │  80 manifest half u32        84 reserved                       │
//! │  88 manifest length u64      96 manifest op u64                │
//! │ 104 free-set bit length u64                                    │
//! │ 112 free-set word count u32  116 free-set checksum u32         │
//! │ 120 reserved (8)                                               │
//! ├────────────────────────────────────────────────────────────────┤
//! │ 128 free-set EWAH words (u64 x word count)                     │
//! │     zero padding to slot_size                                  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Recovery
//! Read every slot, drop the ones that fail validation, take the highest
//! sequence. Cluster-wide recovery only accepts a header held by a strict
//! majority of replicas.

mod free_set;
mod header;
mod quorum;
mod root;

pub use free_set::FreeSet;
pub use header::{ManifestPointer, SuperBlockHeader, VsrState};
pub use quorum::{select_cluster, select_local, SlotRead};
pub use root::SuperBlock;

/// Fixed header bytes before the free-set trailer
pub const HEADER_SIZE: usize = 128;

/// Magic bytes identifying a superblock slot
pub(crate) const MAGIC: &[u8; 8] = b"LDGRSUPR";

/// Current slot format version
pub(crate) const VERSION: u16 = 1;
