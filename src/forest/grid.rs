//! Grid: fixed-size blocks addressed by 1-based index

use crate::error::{Result, StoreError};
use crate::storage::{Layout, Storage};
use crate::superblock::FreeSet;

/// Block storage shared by every tree, with its allocation state
pub struct Grid<S: Storage> {
    storage: S,
    layout: Layout,
    free_set: FreeSet,
}

impl<S: Storage> Grid<S> {
    pub fn new(storage: S, layout: Layout, free_set: FreeSet) -> Self {
        Self {
            storage,
            layout,
            free_set,
        }
    }

    pub fn block_size(&self) -> usize {
        self.layout.block_size as usize
    }

    pub fn acquire(&mut self) -> Result<u64> {
        self.free_set.acquire_block()
    }

    /// Stage a block for release at the next durable checkpoint
    pub fn release(&mut self, address: u64) -> Result<()> {
        self.free_set.release_block(address)
    }

    /// Write `data` at the start of block `address`
    pub fn write_block(&self, address: u64, data: &[u8]) -> Result<()> {
        if data.len() > self.block_size() {
            return Err(StoreError::EntryTooLarge {
                size: data.len(),
                limit: self.block_size(),
            });
        }
        let offset = self.layout.block_offset(address)?;
        self.storage.write(offset, data)
    }

    /// Read the whole of block `address`
    pub fn read_block(&self, address: u64) -> Result<Vec<u8>> {
        let offset = self.layout.block_offset(address)?;
        let mut block = vec![0u8; self.block_size()];
        self.storage.read(offset, &mut block)?;
        Ok(block)
    }

    pub fn block_offset(&self, address: u64) -> Result<u64> {
        self.layout.block_offset(address)
    }

    pub fn sync(&self) -> Result<()> {
        self.storage.sync()
    }

    pub fn free_set(&self) -> &FreeSet {
        &self.free_set
    }

    pub fn free_set_mut(&mut self) -> &mut FreeSet {
        &mut self.free_set
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }
}
