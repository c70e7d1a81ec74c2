//! Manifest Module
//!
//! The structural record of which tables exist at which level of which
//! tree. Every flush and compaction appends insert/remove events; replaying
//! the log from empty reconstructs the live table set.
//!
//! ## Zone Layout
//! The manifest zone is split into two halves. The log grows in the active
//! half; log compaction rewrites the live set into the other half, and the
//! next checkpoint switches the superblock pointer over.
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │ Half 0                       │ Half 1                       │
//! │ rec rec rec ... │ unused     │ rec rec │ unused             │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! ## Record Format (little-endian)
//! ```text
//! ┌───────────┬──────────┬──────────────────────────────────────┐
//! │ CRC (4)   │ Size (4) │ Body (Size bytes)                    │
//! │ size+body │          │                                      │
//! └───────────┴──────────┴──────────────────────────────────────┘
//!
//! Body:
//! ┌────────┬──────────┬───────────┬────────────────────────────┐
//! │ Tag(1) │ Tree (2) │ Level (1) │ Table summary              │
//! └────────┴──────────┴───────────┴────────────────────────────┘
//!
//! Table summary:
//!   id u64 │ op_min u64 │ op_max u64 │ entry_count u64 │ checksum u32
//!   key_min (u32 len + bytes) │ key_max (u32 len + bytes)
//!   address count u32 │ addresses u64 x count (index block first)
//! ```

mod levels;
mod log;
mod record;

pub use levels::Manifest;
pub use log::{compact_events, ManifestLog, ReplayReport, ReplayStop};
pub use record::{ManifestEvent, TableInfo, RECORD_HEADER_SIZE};
