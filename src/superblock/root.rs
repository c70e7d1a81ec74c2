//! SuperBlock: slot rotation and the local recovery entry point

use tracing::{debug, info};

use crate::error::Result;
use crate::storage::{Layout, Storage};

use super::quorum::{select_local, SlotRead};
use super::{ManifestPointer, SuperBlockHeader, VsrState};

/// The node's root record, persisted across rotating slots
///
/// Sequence `s` lives in slot `s % copies`. A new sequence is written and
/// synced before it replaces the working header, so a crash mid-write tears
/// at most the slot of the oldest surviving sequence.
pub struct SuperBlock<S: Storage> {
    storage: S,
    layout: Layout,
    working: SuperBlockHeader,
}

impl<S: Storage> SuperBlock<S> {
    /// Initialize a fresh device: every slot is cleared, then sequence 1
    /// is written with an empty free set and manifest
    pub fn format(storage: S, layout: Layout, vsr: VsrState) -> Result<Self> {
        let zeros = vec![0u8; layout.superblock_slot_size as usize];
        for slot in 0..layout.superblock_copies {
            storage.write(layout.superblock_slot_offset(slot), &zeros)?;
        }
        storage.sync()?;

        let free_set = crate::superblock::FreeSet::new(layout.block_count);
        let mut header = SuperBlockHeader {
            checksum: 0,
            sequence: 1,
            parent: 0,
            vsr,
            manifest: ManifestPointer::default(),
            free_set_len: layout.block_count,
            free_set: free_set.encode_checkpoint(),
        };
        let image = header.encode(layout.superblock_slot_size)?;
        let slot = Self::slot_for(&layout, header.sequence);
        storage.write(layout.superblock_slot_offset(slot), &image)?;
        storage.sync()?;

        info!(
            cluster = vsr.cluster,
            replica = vsr.replica,
            copies = layout.superblock_copies,
            "superblock formatted"
        );
        Ok(Self {
            storage,
            layout,
            working: header,
        })
    }

    /// Read every slot and adopt the highest valid sequence
    pub fn open(storage: S, layout: Layout) -> Result<Self> {
        let reads = Self::read_slots(&storage, &layout)?;
        let working = select_local(&reads)?;
        info!(
            sequence = working.sequence,
            checkpoint_op = working.checkpoint_op(),
            "superblock recovered"
        );
        Ok(Self {
            storage,
            layout,
            working,
        })
    }

    /// Decode every slot without choosing one
    pub fn read_slots(storage: &S, layout: &Layout) -> Result<Vec<SlotRead>> {
        let mut reads = Vec::with_capacity(layout.superblock_copies as usize);
        let mut buf = vec![0u8; layout.superblock_slot_size as usize];
        for slot in 0..layout.superblock_copies {
            let offset = layout.superblock_slot_offset(slot);
            storage.read(offset, &mut buf)?;
            reads.push(SlotRead {
                slot,
                header: SuperBlockHeader::decode(&buf, offset),
            });
        }
        Ok(reads)
    }

    /// The newest durable header
    pub fn working(&self) -> &SuperBlockHeader {
        &self.working
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Persist a new checkpoint. Returns once the slot is durable.
    pub fn checkpoint(
        &mut self,
        vsr: VsrState,
        manifest: ManifestPointer,
        free_set: Vec<u64>,
    ) -> Result<()> {
        let next = SuperBlockHeader {
            checksum: 0,
            sequence: self.working.sequence + 1,
            parent: self.working.checksum,
            vsr,
            manifest,
            free_set_len: self.layout.block_count,
            free_set,
        };
        self.write_next(next)
    }

    /// Persist a new view without moving the checkpoint
    pub fn view_change(&mut self, view: u32, log_view: u32, commit_max: u64) -> Result<()> {
        let mut next = self.working.clone();
        next.sequence += 1;
        next.parent = self.working.checksum;
        next.vsr.view = view;
        next.vsr.log_view = log_view;
        next.vsr.commit_max = next.vsr.commit_max.max(commit_max);
        self.write_next(next)
    }

    fn write_next(&mut self, mut next: SuperBlockHeader) -> Result<()> {
        let image = next.encode(self.layout.superblock_slot_size)?;
        let slot = Self::slot_for(&self.layout, next.sequence);
        self.storage
            .write(self.layout.superblock_slot_offset(slot), &image)?;
        self.storage.sync()?;

        debug!(
            sequence = next.sequence,
            slot,
            checkpoint_op = next.checkpoint_op(),
            "superblock slot written"
        );
        self.working = next;
        Ok(())
    }

    fn slot_for(layout: &Layout, sequence: u64) -> u8 {
        (sequence % layout.superblock_copies as u64) as u8
    }
}
