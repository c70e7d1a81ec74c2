//! Free Set
//!
//! Allocation state of every grid block. A released block is only staged:
//! the last durable superblock may still reference it, so it stays
//! allocated until the next checkpoint is confirmed durable.

use crate::error::{Exhausted, Result, StoreError};
use crate::ewah::{self, BitSet};

/// Allocation bitset over 1-based grid block addresses
#[derive(Debug, Clone)]
pub struct FreeSet {
    /// Bit `a - 1` set means block `a` is in use
    allocated: BitSet,
    /// Releases that take effect at the next durable checkpoint
    staged: BitSet,
    staged_count: u64,
    /// Search hint for the next acquire
    cursor: usize,
}

impl FreeSet {
    /// All `block_count` blocks free
    pub fn new(block_count: u64) -> Self {
        Self {
            allocated: BitSet::new(block_count as usize),
            staged: BitSet::new(block_count as usize),
            staged_count: 0,
            cursor: 0,
        }
    }

    /// Restore from a checkpointed EWAH stream
    pub fn decode(block_count: u64, stream: &[u64]) -> Result<Self> {
        let allocated = ewah::decode(stream, block_count as usize)?;
        Ok(Self {
            allocated,
            staged: BitSet::new(block_count as usize),
            staged_count: 0,
            cursor: 0,
        })
    }

    pub fn block_count(&self) -> u64 {
        self.allocated.len() as u64
    }

    /// Allocate the lowest free block at or after the search hint
    pub fn acquire_block(&mut self) -> Result<u64> {
        let bit = self
            .allocated
            .first_clear_from(self.cursor)
            .or_else(|| self.allocated.first_clear_from(0));
        match bit {
            Some(bit) => {
                self.allocated.set(bit);
                self.cursor = bit + 1;
                Ok(bit as u64 + 1)
            }
            None if self.staged_count > 0 => Err(StoreError::Exhausted(Exhausted::GridBacklog {
                staged: self.staged_count,
            })),
            None => Err(StoreError::Exhausted(Exhausted::GridFull)),
        }
    }

    /// Stage `address` for release at the next durable checkpoint
    pub fn release_block(&mut self, address: u64) -> Result<()> {
        let bit = self.bit(address)?;
        if !self.allocated.get(bit) {
            return Err(StoreError::Corruption(format!(
                "release of free block {}",
                address
            )));
        }
        if self.staged.get(bit) {
            return Err(StoreError::Corruption(format!(
                "block {} released twice",
                address
            )));
        }
        self.staged.set(bit);
        self.staged_count += 1;
        Ok(())
    }

    pub fn is_free(&self, address: u64) -> bool {
        self.bit(address)
            .map(|bit| !self.allocated.get(bit))
            .unwrap_or(false)
    }

    pub fn is_staged(&self, address: u64) -> bool {
        self.bit(address)
            .map(|bit| self.staged.get(bit))
            .unwrap_or(false)
    }

    /// Blocks currently allocated, staged releases included
    pub fn acquired_count(&self) -> u64 {
        self.allocated.count_ones() as u64
    }

    pub fn staged_count(&self) -> u64 {
        self.staged_count
    }

    pub fn free_count(&self) -> u64 {
        self.block_count() - self.acquired_count()
    }

    /// The allocation state as of the checkpoint being written: staged
    /// releases already applied
    pub fn checkpoint_bitset(&self) -> BitSet {
        let words = self
            .allocated
            .words()
            .iter()
            .zip(self.staged.words())
            .map(|(allocated, staged)| allocated & !staged)
            .collect();
        BitSet::from_words(words, self.allocated.len())
    }

    /// EWAH stream for the next superblock
    pub fn encode_checkpoint(&self) -> Vec<u64> {
        ewah::encode(&self.checkpoint_bitset())
    }

    /// The checkpoint carrying the staged releases is durable; reuse them
    pub fn checkpoint_durable(&mut self) {
        if self.staged_count == 0 {
            return;
        }
        let released: Vec<usize> = self.staged.iter_ones().collect();
        for bit in released {
            self.allocated.clear(bit);
        }
        self.staged = BitSet::new(self.allocated.len());
        self.staged_count = 0;
        self.cursor = 0;
    }

    /// Check that every address in `referenced` is allocated, working on
    /// the compressed forms
    pub fn covers(&self, referenced: &BitSet) -> Result<bool> {
        let len = self.allocated.len();
        if referenced.len() != len {
            return Err(StoreError::Corruption(format!(
                "reference set of {} bits checked against free set of {}",
                referenced.len(),
                len
            )));
        }
        let wanted = ewah::encode(referenced);
        let held = ewah::encode(&self.allocated);
        let both = ewah::intersection(&wanted, len, &held, len)?;
        Ok(both == wanted)
    }

    fn bit(&self, address: u64) -> Result<usize> {
        if address == 0 || address > self.block_count() {
            return Err(StoreError::Corruption(format!(
                "block address {} outside grid of {} blocks",
                address,
                self.block_count()
            )));
        }
        Ok(address as usize - 1)
    }
}
