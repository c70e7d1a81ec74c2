//! Manifest events and their framing

use bytes::{Buf, BufMut};

use crate::checksum::checksum;
use crate::error::{Result, StoreError, Unit};
use crate::journal::TreeId;

/// Checksum + size prefix of every record
pub const RECORD_HEADER_SIZE: usize = 8;

const INSERT: u8 = 0x01;
const REMOVE: u8 = 0x02;

/// Summary of one immutable table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableInfo {
    /// Unique within the forest
    pub id: u64,
    pub key_min: Vec<u8>,
    pub key_max: Vec<u8>,
    pub op_min: u64,
    pub op_max: u64,
    pub entry_count: u64,
    /// Checksum of the index block
    pub checksum: u32,
    /// Grid addresses: the index block, then the data blocks in key order
    pub addresses: Vec<u64>,
}

impl TableInfo {
    /// Whether `[key_min, key_max]` intersects this table's key range
    pub fn overlaps(&self, key_min: &[u8], key_max: &[u8]) -> bool {
        self.key_min.as_slice() <= key_max && key_min <= self.key_max.as_slice()
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.key_min.as_slice() <= key && key <= self.key_max.as_slice()
    }

    pub fn index_address(&self) -> Option<u64> {
        self.addresses.first().copied()
    }

    pub fn data_addresses(&self) -> &[u64] {
        self.addresses.get(1..).unwrap_or(&[])
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.put_u64_le(self.id);
        buf.put_u64_le(self.op_min);
        buf.put_u64_le(self.op_max);
        buf.put_u64_le(self.entry_count);
        buf.put_u32_le(self.checksum);
        buf.put_u32_le(self.key_min.len() as u32);
        buf.put_slice(&self.key_min);
        buf.put_u32_le(self.key_max.len() as u32);
        buf.put_slice(&self.key_max);
        buf.put_u32_le(self.addresses.len() as u32);
        for address in &self.addresses {
            buf.put_u64_le(*address);
        }
    }

    fn decode_from(buf: &mut &[u8]) -> Result<Self> {
        need(buf, 36)?;
        let id = buf.get_u64_le();
        let op_min = buf.get_u64_le();
        let op_max = buf.get_u64_le();
        let entry_count = buf.get_u64_le();
        let checksum = buf.get_u32_le();
        let key_min = take_bytes(buf)?;
        let key_max = take_bytes(buf)?;
        need(buf, 4)?;
        let count = buf.get_u32_le() as usize;
        need(buf, count * 8)?;
        let addresses = (0..count).map(|_| buf.get_u64_le()).collect();
        Ok(Self {
            id,
            key_min,
            key_max,
            op_min,
            op_max,
            entry_count,
            checksum,
            addresses,
        })
    }
}

/// One structural change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEvent {
    Insert {
        tree: TreeId,
        level: u8,
        table: TableInfo,
    },
    Remove {
        tree: TreeId,
        level: u8,
        table: TableInfo,
    },
}

impl ManifestEvent {
    pub fn tree(&self) -> TreeId {
        match self {
            ManifestEvent::Insert { tree, .. } | ManifestEvent::Remove { tree, .. } => *tree,
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            ManifestEvent::Insert { level, .. } | ManifestEvent::Remove { level, .. } => *level,
        }
    }

    pub fn table(&self) -> &TableInfo {
        match self {
            ManifestEvent::Insert { table, .. } | ManifestEvent::Remove { table, .. } => table,
        }
    }

    /// Encode as a framed record: checksum, size, body
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let tag = match self {
            ManifestEvent::Insert { .. } => INSERT,
            ManifestEvent::Remove { .. } => REMOVE,
        };
        body.put_u8(tag);
        body.put_u16_le(self.tree());
        body.put_u8(self.level());
        self.table().encode_into(&mut body);

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + body.len());
        record.put_u32_le(0);
        record.put_u32_le(body.len() as u32);
        record.put_slice(&body);
        let crc = checksum(&record[4..]);
        record[0..4].copy_from_slice(&crc.to_le_bytes());
        record
    }

    /// Decode one framed record from the front of `bytes`
    ///
    /// Returns the event and the record length. `offset` is the device
    /// offset of `bytes`, used in errors.
    pub fn decode(bytes: &[u8], offset: u64) -> Result<(Self, usize)> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(StoreError::TornWrite {
                unit: Unit::ManifestRecord,
                offset,
                declared: RECORD_HEADER_SIZE as u64,
                available: bytes.len() as u64,
            });
        }
        let mut header = &bytes[..RECORD_HEADER_SIZE];
        let stored = header.get_u32_le();
        let size = header.get_u32_le() as usize;
        let total = RECORD_HEADER_SIZE + size;
        if total > bytes.len() {
            return Err(StoreError::TornWrite {
                unit: Unit::ManifestRecord,
                offset,
                declared: total as u64,
                available: bytes.len() as u64,
            });
        }
        if stored != checksum(&bytes[4..total]) {
            return Err(StoreError::Checksum {
                unit: Unit::ManifestRecord,
                offset,
            });
        }

        let mut body = &bytes[RECORD_HEADER_SIZE..total];
        need(&body, 4)?;
        let tag = body.get_u8();
        let tree = body.get_u16_le();
        let level = body.get_u8();
        let table = TableInfo::decode_from(&mut body)?;
        if body.has_remaining() {
            return Err(StoreError::Corruption(format!(
                "manifest record at {} has {} trailing bytes",
                offset,
                body.remaining()
            )));
        }
        let event = match tag {
            INSERT => ManifestEvent::Insert { tree, level, table },
            REMOVE => ManifestEvent::Remove { tree, level, table },
            _ => {
                return Err(StoreError::Corruption(format!(
                    "manifest record at {} has unknown tag {}",
                    offset, tag
                )))
            }
        };
        Ok((event, total))
    }
}

fn need(buf: &&[u8], len: usize) -> Result<()> {
    if buf.remaining() < len {
        return Err(StoreError::Corruption(format!(
            "manifest table summary truncated: need {} bytes, {} left",
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

fn take_bytes(buf: &mut &[u8]) -> Result<Vec<u8>> {
    need(buf, 4)?;
    let len = buf.get_u32_le() as usize;
    need(buf, len)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}
