//! LSM Tree Module
//!
//! One tree per logical table. Writes land in a mutable in-memory buffer;
//! a full buffer is frozen and flushed into level 1; compaction merges
//! level L into level L + 1. Every entry is versioned by the op that wrote
//! it, so reads at a snapshot see exactly the ops at or below it.
//!
//! ## Read Path
//! ```text
//!   mutable buffer ──► frozen buffer ──► level 1 ──► level 2 ──► ... ──► level N
//!   (newest)                                                           (oldest)
//! ```
//! For one key, every version in level L is newer than every version in
//! level L + 1. Tables inside a level have disjoint key ranges.
//!
//! ## Table Format
//! A table is a run of data blocks plus one index block, each a grid block.
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Block Header (16 bytes)                                 │
//! │   CRC: u32 (bytes 4..16 + payload) | Count: u32         │
//! │   PayloadLen: u32 | Kind: u8 | Reserved (3)             │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data payload                                            │
//! │   [KeyLen: u32][Key][Op: u64][ValLen: u32][Value]       │
//! │   ... sorted by key, then op descending ...             │
//! │   (ValLen = u32::MAX means tombstone, no value bytes)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index payload                                           │
//! │   [Address: u64][BlockCRC: u32][KeyLen: u32][FirstKey]  │
//! │   ... one per data block, in key order ...              │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod buffer;
mod compaction;
mod merge;
mod scan;
mod table;
mod tree;

pub use buffer::{Buffer, Frozen};
pub use scan::{Scan, ScanCursor};
pub use table::{check_entry_fits, index_capacity, IndexEntry, TableBuilder, BLOCK_HEADER_SIZE};
pub use tree::{Tree, TreeStats};

/// One version of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub op: u64,
    /// `None` is a tombstone
    pub value: Option<Vec<u8>>,
}

impl Entry {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}
