//! Journal ring writer

use tracing::{debug, info, trace};

use crate::error::{Exhausted, Result, StoreError};
use crate::storage::{Layout, Storage};

use super::recovery::{recover, Recovered};
use super::{Command, RecordHeader, HEADER_SIZE};

/// Appends records to the journal ring
pub struct Journal<S: Storage> {
    storage: S,
    layout: Layout,
    /// Last appended (or recovered) op
    head_op: u64,
    /// Header checksum of `head_op`
    head_checksum: u32,
    /// Ops at or below this are captured by a durable checkpoint
    checkpoint_op: u64,
}

impl<S: Storage> Journal<S> {
    /// Clear every slot header so no stale record survives a reformat
    pub fn format(storage: S, layout: Layout) -> Result<Self> {
        let zeros = [0u8; HEADER_SIZE];
        for slot in 0..layout.journal_slot_count {
            storage.write(layout.journal_slot_offset(slot), &zeros)?;
        }
        storage.sync()?;
        info!(slots = layout.journal_slot_count, "journal formatted");
        Ok(Self {
            storage,
            layout,
            head_op: 0,
            head_checksum: 0,
            checkpoint_op: 0,
        })
    }

    /// Recover the records after `checkpoint_op` and position the head
    /// after the last valid one
    pub fn open(storage: S, layout: Layout, checkpoint_op: u64) -> Result<(Self, Recovered)> {
        let recovered = recover(&storage, &layout, checkpoint_op)?;
        let journal = Self {
            storage,
            layout,
            head_op: recovered.report.last_op,
            head_checksum: recovered.report.last_checksum,
            checkpoint_op,
        };
        Ok((journal, recovered))
    }

    /// Append the record for `op` and wait until it is durable
    ///
    /// Returns the record's header checksum.
    pub fn append(&mut self, op: u64, command: &Command) -> Result<u32> {
        if op != self.head_op + 1 {
            return Err(StoreError::OpOrder {
                expected: self.head_op + 1,
                got: op,
            });
        }
        if op > self.checkpoint_op + self.layout.journal_slot_count {
            return Err(StoreError::Exhausted(Exhausted::JournalFull {
                checkpoint_op: self.checkpoint_op,
            }));
        }

        let body = command.encode()?;
        let limit = self.layout.journal_slot_size as usize - HEADER_SIZE;
        if body.len() > limit {
            return Err(StoreError::EntryTooLarge {
                size: body.len(),
                limit,
            });
        }

        let header = RecordHeader::new(op, command.tag() as u8, self.head_checksum, &body);
        let mut record = Vec::with_capacity(HEADER_SIZE + body.len());
        record.extend_from_slice(&header.encode());
        record.extend_from_slice(&body);

        self.storage
            .write(self.layout.journal_slot_offset(op), &record)?;
        self.storage.sync()?;

        trace!(op, size = body.len(), "journal record appended");
        self.head_op = op;
        self.head_checksum = header.checksum;
        Ok(header.checksum)
    }

    /// A checkpoint at `op` is durable: slots up to `op` may be reused
    pub fn checkpoint(&mut self, op: u64) -> Result<()> {
        if op < self.checkpoint_op || op > self.head_op {
            return Err(StoreError::OpOrder {
                expected: self.head_op,
                got: op,
            });
        }
        debug!(op, previous = self.checkpoint_op, "journal checkpoint");
        self.checkpoint_op = op;
        Ok(())
    }

    pub fn head_op(&self) -> u64 {
        self.head_op
    }

    pub fn checkpoint_op(&self) -> u64 {
        self.checkpoint_op
    }

    pub fn slot_count(&self) -> u64 {
        self.layout.journal_slot_count
    }

    /// Ops that can still be appended before a checkpoint is required
    pub fn remaining(&self) -> u64 {
        (self.checkpoint_op + self.layout.journal_slot_count).saturating_sub(self.head_op)
    }
}
