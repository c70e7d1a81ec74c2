//! EWAH Bitmap Codec
//!
//! Compressed run-length encoding for large sparse bitsets (the free set is
//! the main user). Set operations run on the compressed form directly.
//!
//! ## Word Stream
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ Marker word (u64, little-endian on disk)                       │
//! │ ┌──────────┬─────────────────────────┬───────────────────────┐ │
//! │ │ Fill (1) │ Run length (32 bits)    │ Literal count (31)    │ │
//! │ │ bit 0    │ bits 1..=32             │ bits 33..=63          │ │
//! │ └──────────┴─────────────────────────┴───────────────────────┘ │
//! ├────────────────────────────────────────────────────────────────┤
//! │ Literal words (u64) x literal count                            │
//! ├────────────────────────────────────────────────────────────────┤
//! │ Marker word ...                                                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A marker stands for `run length` words that are all zeros (fill 0) or all
//! ones (fill 1), followed by `literal count` verbatim words. The only
//! metadata needed to decode is the bit length of the set.

mod bitset;
mod codec;
mod ops;

pub use bitset::BitSet;
pub use codec::{decode, encode, max_encoded_words, Chunk, EwahReader, EwahWriter};
pub use ops::{intersection, union};

/// Largest run a single marker can describe
pub const RUN_LENGTH_MAX: u64 = (1 << 32) - 1;

/// Largest literal count a single marker can describe
pub const LITERAL_COUNT_MAX: u64 = (1 << 31) - 1;
