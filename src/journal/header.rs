//! Journal record header

use bytes::{Buf, BufMut};

use crate::checksum::checksum;
use crate::error::{Result, StoreError, Unit};

use super::HEADER_SIZE;

/// The fixed 32-byte prefix of a journal slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// CRC32 over header bytes 4..32
    pub checksum: u32,
    pub checksum_body: u32,
    pub op: u64,
    /// Body length in bytes
    pub size: u32,
    pub command: u8,
    /// Header checksum of the record for op - 1
    pub parent: u32,
}

impl RecordHeader {
    /// Build a header for `body` and compute its checksum
    pub fn new(op: u64, command: u8, parent: u32, body: &[u8]) -> Self {
        let mut header = Self {
            checksum: 0,
            checksum_body: checksum(body),
            op,
            size: body.len() as u32,
            command,
            parent,
        };
        header.checksum = checksum(&header.encode()[4..]);
        header
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.checksum);
        buf.put_u32_le(self.checksum_body);
        buf.put_u64_le(self.op);
        buf.put_u32_le(self.size);
        buf.put_u8(self.command);
        buf.put_bytes(0, 3);
        buf.put_u32_le(self.parent);
        buf.put_bytes(0, 4);
        out
    }

    /// Decode and verify the header checksum
    pub fn decode(bytes: &[u8], offset: u64) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::TornWrite {
                unit: Unit::JournalRecord,
                offset,
                declared: HEADER_SIZE as u64,
                available: bytes.len() as u64,
            });
        }
        let mut buf = &bytes[..HEADER_SIZE];
        let stored = buf.get_u32_le();
        if stored != checksum(&bytes[4..HEADER_SIZE]) {
            return Err(StoreError::Checksum {
                unit: Unit::JournalRecord,
                offset,
            });
        }
        let checksum_body = buf.get_u32_le();
        let op = buf.get_u64_le();
        let size = buf.get_u32_le();
        let command = buf.get_u8();
        buf.advance(3);
        let parent = buf.get_u32_le();
        Ok(Self {
            checksum: stored,
            checksum_body,
            op,
            size,
            command,
            parent,
        })
    }

    /// True for a slot that was never written
    pub fn is_zeroed(bytes: &[u8]) -> bool {
        bytes.iter().take(HEADER_SIZE).all(|b| *b == 0)
    }
}
