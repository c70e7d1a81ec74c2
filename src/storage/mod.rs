//! Storage Module
//!
//! The block device beneath everything else: one flat address space split
//! into fixed zones.
//!
//! ## Data File Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Superblock zone: N slots x superblock_slot_size          │
//! ├──────────────────────────────────────────────────────────┤
//! │ Journal zone: journal_slot_count x journal_slot_size     │
//! ├──────────────────────────────────────────────────────────┤
//! │ Manifest zone: two halves of manifest_zone_size / 2      │
//! ├──────────────────────────────────────────────────────────┤
//! │ Grid zone: grid_block_count x block_size                 │
//! │   (block address A lives at grid_offset + (A-1)*size)    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Backends
//! - `FileStorage`: a single preallocated data file
//! - `MemoryStorage`: a shared byte vector with crash injection
//! - `QueuedStorage`: asynchronous writes through a bounded queue

mod file;
mod layout;
mod memory;
mod queue;

pub use file::FileStorage;
pub use layout::{Layout, Zone};
pub use memory::MemoryStorage;
pub use queue::QueuedStorage;

use crate::error::Result;

/// A block device
///
/// Handles are cheap to clone and all clones address the same device. There
/// is no partial-write abort: a write either lands or the process is treated
/// as crashed.
pub trait Storage: Clone {
    /// Read exactly `buf.len()` bytes at `offset`
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at `offset`
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Make every completed write durable
    fn sync(&self) -> Result<()>;

    /// Device size in bytes
    fn size(&self) -> u64;
}
