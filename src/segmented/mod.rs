//! Segmented Ordered Container
//!
//! A sorted, growable array split into fixed-capacity segments. Inserts and
//! removes shift at most one segment; a segment that grows past its capacity
//! is split, one that drains below the low watermark is merged with (or
//! refilled from) a neighbour.
//!
//! ```text
//!   segments:  [ 1  3  4  7 ] [ 9 12 15 ] [ 20 21 30 31 ]
//!                   ▲                            ▲
//!   lookup: binary search on each segment's last element,
//!           then binary search inside the segment
//! ```
//!
//! Used for the per-level table lists of the manifest.

mod array;

pub use array::{Cursor, SegmentedArray};

/// Default elements per segment
pub const DEFAULT_SEGMENT_CAPACITY: usize = 64;
