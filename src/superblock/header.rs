//! Superblock header encoding

use bytes::{Buf, BufMut};

use crate::checksum::checksum;
use crate::error::{Result, StoreError, Unit};

use super::{HEADER_SIZE, MAGIC, VERSION};

/// Replication bookkeeping persisted with every sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VsrState {
    pub cluster: u128,
    pub replica: u8,
    pub replica_count: u8,
    pub view: u32,
    pub log_view: u32,
    /// Op of the checkpoint this sequence describes
    pub commit_min: u64,
    /// Highest op known committed cluster-wide
    pub commit_max: u64,
}

/// Where the durable manifest log ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ManifestPointer {
    /// Active half of the manifest zone
    pub half: u32,
    /// Durable bytes in that half
    pub length: u64,
    /// Op at which the log was captured
    pub op: u64,
}

/// One decoded superblock slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlockHeader {
    /// Self checksum; filled in by `encode`/`decode`
    pub checksum: u32,
    pub sequence: u64,
    /// Checksum of the previous sequence
    pub parent: u32,
    pub vsr: VsrState,
    pub manifest: ManifestPointer,
    /// Free-set bit length (grid block count)
    pub free_set_len: u64,
    /// Free-set EWAH word stream
    pub free_set: Vec<u64>,
}

impl SuperBlockHeader {
    /// Encode into a full slot image and set `self.checksum`
    pub fn encode(&mut self, slot_size: u64) -> Result<Vec<u8>> {
        let trailer = self.free_set.len() * 8;
        if HEADER_SIZE + trailer > slot_size as usize {
            return Err(StoreError::Config(format!(
                "free set of {} words does not fit a {} byte superblock slot",
                self.free_set.len(),
                slot_size
            )));
        }

        let mut words = Vec::with_capacity(trailer);
        for word in &self.free_set {
            words.put_u64_le(*word);
        }

        let mut buf = Vec::with_capacity(slot_size as usize);
        buf.put_u32_le(0); // checksum, patched below
        buf.put_slice(MAGIC);
        buf.put_u16_le(VERSION);
        buf.put_u16_le(0);
        buf.put_u64_le(self.sequence);
        buf.put_u32_le(self.parent);
        buf.put_u32_le(0);
        buf.put_u128_le(self.vsr.cluster);
        buf.put_u8(self.vsr.replica);
        buf.put_u8(self.vsr.replica_count);
        buf.put_bytes(0, 6);
        buf.put_u32_le(self.vsr.view);
        buf.put_u32_le(self.vsr.log_view);
        buf.put_u64_le(self.vsr.commit_min);
        buf.put_u64_le(self.vsr.commit_max);
        buf.put_u32_le(self.manifest.half);
        buf.put_u32_le(0);
        buf.put_u64_le(self.manifest.length);
        buf.put_u64_le(self.manifest.op);
        buf.put_u64_le(self.free_set_len);
        buf.put_u32_le(self.free_set.len() as u32);
        buf.put_u32_le(checksum(&words));
        buf.put_bytes(0, 8);
        debug_assert_eq!(buf.len(), HEADER_SIZE);
        buf.put_slice(&words);
        buf.resize(slot_size as usize, 0);

        self.checksum = checksum(&buf[4..]);
        buf[0..4].copy_from_slice(&self.checksum.to_le_bytes());
        Ok(buf)
    }

    /// Decode and validate a slot image read from `offset`
    pub fn decode(slot: &[u8], offset: u64) -> Result<Self> {
        if slot.len() < HEADER_SIZE {
            return Err(StoreError::TornWrite {
                unit: Unit::SuperblockSlot,
                offset,
                declared: HEADER_SIZE as u64,
                available: slot.len() as u64,
            });
        }

        let mut buf = slot;
        let stored = buf.get_u32_le();
        if stored != checksum(&slot[4..]) {
            return Err(StoreError::Checksum {
                unit: Unit::SuperblockSlot,
                offset,
            });
        }

        let mut magic = [0u8; 8];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(StoreError::Corruption(format!(
                "superblock slot at {} has bad magic {:?}",
                offset, magic
            )));
        }
        let version = buf.get_u16_le();
        if version != VERSION {
            return Err(StoreError::Corruption(format!(
                "unsupported superblock version {}",
                version
            )));
        }
        buf.advance(2);

        let sequence = buf.get_u64_le();
        let parent = buf.get_u32_le();
        buf.advance(4);
        let cluster = buf.get_u128_le();
        let replica = buf.get_u8();
        let replica_count = buf.get_u8();
        buf.advance(6);
        let view = buf.get_u32_le();
        let log_view = buf.get_u32_le();
        let commit_min = buf.get_u64_le();
        let commit_max = buf.get_u64_le();
        let half = buf.get_u32_le();
        buf.advance(4);
        let length = buf.get_u64_le();
        let manifest_op = buf.get_u64_le();
        let free_set_len = buf.get_u64_le();
        let word_count = buf.get_u32_le() as usize;
        let words_checksum = buf.get_u32_le();
        buf.advance(8);

        if word_count * 8 > buf.remaining() {
            return Err(StoreError::TornWrite {
                unit: Unit::SuperblockSlot,
                offset,
                declared: (HEADER_SIZE + word_count * 8) as u64,
                available: slot.len() as u64,
            });
        }
        let trailer = &buf[..word_count * 8];
        if checksum(trailer) != words_checksum {
            return Err(StoreError::Checksum {
                unit: Unit::SuperblockSlot,
                offset: offset + HEADER_SIZE as u64,
            });
        }
        let mut trailer_buf = trailer;
        let free_set = (0..word_count).map(|_| trailer_buf.get_u64_le()).collect();

        Ok(Self {
            checksum: stored,
            sequence,
            parent,
            vsr: VsrState {
                cluster,
                replica,
                replica_count,
                view,
                log_view,
                commit_min,
                commit_max,
            },
            manifest: ManifestPointer {
                half,
                length,
                op: manifest_op,
            },
            free_set_len,
            free_set,
        })
    }

    /// Op of the checkpoint captured by this header
    pub fn checkpoint_op(&self) -> u64 {
        self.vsr.commit_min
    }

    /// Checksum of the checkpoint state alone
    ///
    /// Replicas at the same checkpoint share this value even though their
    /// replica index, views and parent chains differ.
    pub fn checkpoint_id(&self) -> u32 {
        let mut buf = Vec::with_capacity(48 + self.free_set.len() * 8);
        buf.put_u64_le(self.sequence);
        buf.put_u64_le(self.vsr.commit_min);
        buf.put_u32_le(self.manifest.half);
        buf.put_u64_le(self.manifest.length);
        buf.put_u64_le(self.manifest.op);
        buf.put_u64_le(self.free_set_len);
        for word in &self.free_set {
            buf.put_u64_le(*word);
        }
        checksum(&buf)
    }
}
