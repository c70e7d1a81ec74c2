//! Table blocks: builder, index, point lookups and sequential reads

use std::ops::Bound;

use bytes::{Buf, BufMut};
use tracing::trace;

use crate::checksum::checksum;
use crate::error::{Result, StoreError, Unit};
use crate::forest::Grid;
use crate::manifest::TableInfo;
use crate::storage::Storage;

use super::Entry;

/// Header bytes at the start of every table block
pub const BLOCK_HEADER_SIZE: usize = 16;

/// Sentinel value length marking a tombstone
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

const KIND_DATA: u8 = 1;
const KIND_INDEX: u8 = 2;

/// Fixed bytes of an index entry besides the key
const INDEX_ENTRY_OVERHEAD: usize = 16;

/// One data block as listed by the index block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub first_key: Vec<u8>,
    pub address: u64,
    pub checksum: u32,
}

// =============================================================================
// Block Codec
// =============================================================================

fn encode_block(kind: u8, count: u32, payload: &[u8]) -> (Vec<u8>, u32) {
    let mut block = Vec::with_capacity(BLOCK_HEADER_SIZE + payload.len());
    block.put_u32_le(0);
    block.put_u32_le(count);
    block.put_u32_le(payload.len() as u32);
    block.put_u8(kind);
    block.put_bytes(0, 3);
    block.put_slice(payload);
    let crc = checksum(&block[4..]);
    block[0..4].copy_from_slice(&crc.to_le_bytes());
    (block, crc)
}

/// Validate a block and return `(count, payload)`
fn decode_block(block: &[u8], offset: u64, kind: u8, unit: Unit) -> Result<(u32, &[u8])> {
    let mut header = &block[..BLOCK_HEADER_SIZE.min(block.len())];
    if header.remaining() < BLOCK_HEADER_SIZE {
        return Err(StoreError::TornWrite {
            unit,
            offset,
            declared: BLOCK_HEADER_SIZE as u64,
            available: block.len() as u64,
        });
    }
    let stored = header.get_u32_le();
    let count = header.get_u32_le();
    let len = header.get_u32_le() as usize;
    let found_kind = header.get_u8();
    let end = BLOCK_HEADER_SIZE + len;
    if end > block.len() {
        return Err(StoreError::TornWrite {
            unit,
            offset,
            declared: end as u64,
            available: block.len() as u64,
        });
    }
    if stored != checksum(&block[4..end]) {
        return Err(StoreError::Checksum { unit, offset });
    }
    if found_kind != kind {
        return Err(StoreError::Corruption(format!(
            "block at {} has kind {}, expected {}",
            offset, found_kind, kind
        )));
    }
    Ok((count, &block[BLOCK_HEADER_SIZE..end]))
}

fn encoded_len(entry: &Entry) -> usize {
    entry_len(entry.key.len(), entry.value.as_ref().map_or(0, |v| v.len()))
}

fn entry_len(key_len: usize, value_len: usize) -> usize {
    4 + key_len + 8 + 4 + value_len
}

/// Fail with `EntryTooLarge` unless one version of a key fits a data
/// block of `block_size` bytes
pub fn check_entry_fits(key_len: usize, value_len: usize, block_size: usize) -> Result<()> {
    let size = entry_len(key_len, value_len);
    let limit = block_size.saturating_sub(BLOCK_HEADER_SIZE);
    if size > limit {
        return Err(StoreError::EntryTooLarge { size, limit });
    }
    Ok(())
}

fn encode_entry(buf: &mut Vec<u8>, entry: &Entry) {
    buf.put_u32_le(entry.key.len() as u32);
    buf.put_slice(&entry.key);
    buf.put_u64_le(entry.op);
    match &entry.value {
        Some(value) => {
            buf.put_u32_le(value.len() as u32);
            buf.put_slice(value);
        }
        None => buf.put_u32_le(TOMBSTONE_MARKER),
    }
}

fn corrupt(offset: u64, what: &str) -> StoreError {
    StoreError::Corruption(format!("table block at {}: {}", offset, what))
}

fn take<'a>(buf: &mut &'a [u8], len: usize, offset: u64) -> Result<&'a [u8]> {
    if buf.len() < len {
        return Err(corrupt(offset, "entry runs past payload"));
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn decode_entries(payload: &[u8], count: u32, offset: u64) -> Result<Vec<Entry>> {
    let mut buf = payload;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key_len = take(&mut buf, 4, offset)?.get_u32_le() as usize;
        let key = take(&mut buf, key_len, offset)?.to_vec();
        let op = take(&mut buf, 8, offset)?.get_u64_le();
        let value_len = take(&mut buf, 4, offset)?.get_u32_le();
        let value = if value_len == TOMBSTONE_MARKER {
            None
        } else {
            Some(take(&mut buf, value_len as usize, offset)?.to_vec())
        };
        entries.push(Entry { key, op, value });
    }
    if !buf.is_empty() {
        return Err(corrupt(offset, "trailing bytes after last entry"));
    }
    Ok(entries)
}

fn decode_index(payload: &[u8], count: u32, offset: u64) -> Result<Vec<IndexEntry>> {
    let mut buf = payload;
    let mut index = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let address = take(&mut buf, 8, offset)?.get_u64_le();
        let checksum = take(&mut buf, 4, offset)?.get_u32_le();
        let key_len = take(&mut buf, 4, offset)?.get_u32_le() as usize;
        let first_key = take(&mut buf, key_len, offset)?.to_vec();
        index.push(IndexEntry {
            first_key,
            address,
            checksum,
        });
    }
    Ok(index)
}

// =============================================================================
// Builder
// =============================================================================

/// Writes sorted entries into grid blocks, one table at a time
///
/// Entries must arrive in merge order: key ascending, op descending.
///
/// A table has one index block, so it lists at most `index_capacity` data
/// blocks. Tables only end at key boundaries, which bounds the versions of
/// a single key kept above the snapshot floor: they must fit that many
/// data blocks, or `finish` fails with `EntryTooLarge`. Checkpoints raise
/// the floor and let merges collapse older versions.
pub struct TableBuilder {
    id: u64,
    /// Payload bytes that fit in one block
    block_limit: usize,

    payload: Vec<u8>,
    block_entries: u32,
    block_first_key: Vec<u8>,

    index: Vec<u8>,
    index_entries: u32,
    data_addresses: Vec<u64>,

    key_min: Option<Vec<u8>>,
    key_max: Vec<u8>,
    op_min: u64,
    op_max: u64,
    entry_count: u64,
}

/// Data blocks one index block can list for keys of `key_len` bytes
pub fn index_capacity(block_size: usize, key_len: usize) -> usize {
    block_size.saturating_sub(BLOCK_HEADER_SIZE) / (INDEX_ENTRY_OVERHEAD + key_len)
}

impl TableBuilder {
    pub fn new(id: u64, block_size: usize) -> Self {
        Self {
            id,
            block_limit: block_size - BLOCK_HEADER_SIZE,
            payload: Vec::new(),
            block_entries: 0,
            block_first_key: Vec::new(),
            index: Vec::new(),
            index_entries: 0,
            data_addresses: Vec::new(),
            key_min: None,
            key_max: Vec::new(),
            op_min: u64::MAX,
            op_max: 0,
            entry_count: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn last_key(&self) -> Option<&[u8]> {
        self.key_min.as_ref().map(|_| self.key_max.as_slice())
    }

    /// Whether the table should end before starting a new key of
    /// `key_len` bytes
    pub fn should_finish(&self, key_len: usize, entries_max: usize) -> bool {
        if self.entry_count as usize >= entries_max {
            return true;
        }
        let pending = if self.payload.is_empty() {
            0
        } else {
            INDEX_ENTRY_OVERHEAD + self.block_first_key.len()
        };
        self.index.len() + pending + INDEX_ENTRY_OVERHEAD + key_len > self.block_limit
    }

    /// Append one entry, writing out the current data block first if the
    /// entry does not fit. Nothing changes when this fails.
    pub fn add<S: Storage>(&mut self, grid: &mut Grid<S>, entry: &Entry) -> Result<()> {
        let len = encoded_len(entry);
        if len > self.block_limit {
            return Err(StoreError::EntryTooLarge {
                size: len,
                limit: self.block_limit,
            });
        }
        if !self.payload.is_empty() && self.payload.len() + len > self.block_limit {
            self.flush_block(grid)?;
        }
        if self.payload.is_empty() {
            self.block_first_key = entry.key.clone();
        }
        encode_entry(&mut self.payload, entry);
        self.block_entries += 1;

        if self.key_min.is_none() {
            self.key_min = Some(entry.key.clone());
        }
        if self.key_max != entry.key {
            self.key_max = entry.key.clone();
        }
        self.op_min = self.op_min.min(entry.op);
        self.op_max = self.op_max.max(entry.op);
        self.entry_count += 1;
        Ok(())
    }

    /// Write the last data block and the index block
    pub fn finish<S: Storage>(&mut self, grid: &mut Grid<S>) -> Result<TableInfo> {
        if !self.payload.is_empty() {
            self.flush_block(grid)?;
        }
        let key_min = self
            .key_min
            .clone()
            .ok_or_else(|| StoreError::Corruption("finishing an empty table".to_string()))?;

        let (block, crc) = encode_block(KIND_INDEX, self.index_entries, &self.index);
        let address = grid.acquire()?;
        grid.write_block(address, &block)?;

        let mut addresses = Vec::with_capacity(1 + self.data_addresses.len());
        addresses.push(address);
        addresses.extend_from_slice(&self.data_addresses);

        trace!(
            table = self.id,
            entries = self.entry_count,
            blocks = addresses.len(),
            "table written"
        );
        Ok(TableInfo {
            id: self.id,
            key_min,
            key_max: self.key_max.clone(),
            op_min: self.op_min,
            op_max: self.op_max,
            entry_count: self.entry_count,
            checksum: crc,
            addresses,
        })
    }

    fn flush_block<S: Storage>(&mut self, grid: &mut Grid<S>) -> Result<()> {
        let index_after = self.index.len() + INDEX_ENTRY_OVERHEAD + self.block_first_key.len();
        if index_after > self.block_limit {
            return Err(StoreError::EntryTooLarge {
                size: index_after,
                limit: self.block_limit,
            });
        }
        let (block, crc) = encode_block(KIND_DATA, self.block_entries, &self.payload);
        let address = grid.acquire()?;
        grid.write_block(address, &block)?;

        self.index.put_u64_le(address);
        self.index.put_u32_le(crc);
        self.index.put_u32_le(self.block_first_key.len() as u32);
        self.index.put_slice(&self.block_first_key);
        self.index_entries += 1;
        self.data_addresses.push(address);
        self.payload.clear();
        self.block_entries = 0;
        Ok(())
    }
}

// =============================================================================
// Readers
// =============================================================================

/// Load and validate the index block of `table`
pub fn read_index<S: Storage>(grid: &Grid<S>, table: &TableInfo) -> Result<Vec<IndexEntry>> {
    let address = table
        .index_address()
        .ok_or_else(|| StoreError::Corruption(format!("table {} has no blocks", table.id)))?;
    let offset = grid.block_offset(address)?;
    let block = grid.read_block(address)?;
    let (count, payload) = decode_block(&block, offset, KIND_INDEX, Unit::Table)?;
    let crc = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
    if crc != table.checksum {
        return Err(StoreError::Checksum {
            unit: Unit::Table,
            offset,
        });
    }
    decode_index(payload, count, offset)
}

/// Load and validate one data block
pub fn read_data_block<S: Storage>(grid: &Grid<S>, entry: &IndexEntry) -> Result<Vec<Entry>> {
    let offset = grid.block_offset(entry.address)?;
    let block = grid.read_block(entry.address)?;
    let (count, payload) = decode_block(&block, offset, KIND_DATA, Unit::TableBlock)?;
    let crc = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
    if crc != entry.checksum {
        return Err(StoreError::Checksum {
            unit: Unit::TableBlock,
            offset,
        });
    }
    decode_entries(payload, count, offset)
}

/// Index of the first data block that may hold `key`
///
/// A key's versions may start at the end of the block before the first
/// block whose first key is not below `key`.
fn start_block(index: &[IndexEntry], key: &[u8]) -> usize {
    let p = index.partition_point(|e| e.first_key.as_slice() < key);
    p.max(1) - 1
}

/// Newest version of `key` at or below `snapshot` stored in `table`
pub fn get<S: Storage>(
    grid: &Grid<S>,
    table: &TableInfo,
    key: &[u8],
    snapshot: u64,
) -> Result<Option<Entry>> {
    let index = read_index(grid, table)?;
    for block in &index[start_block(&index, key)..] {
        if block.first_key.as_slice() > key {
            break;
        }
        for entry in read_data_block(grid, block)? {
            match entry.key.as_slice().cmp(key) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Greater => return Ok(None),
                std::cmp::Ordering::Equal if entry.op <= snapshot => return Ok(Some(entry)),
                std::cmp::Ordering::Equal => continue,
            }
        }
    }
    Ok(None)
}

/// Sequential reader over one table, starting after a bound
pub struct TableSource {
    table: TableInfo,
    start: Bound<Vec<u8>>,
    index: Option<Vec<IndexEntry>>,
    next_block: usize,
    entries: std::vec::IntoIter<Entry>,
}

impl TableSource {
    pub fn new(table: TableInfo, start: Bound<Vec<u8>>) -> Self {
        Self {
            table,
            start,
            index: None,
            next_block: 0,
            entries: Vec::new().into_iter(),
        }
    }

    pub fn next_entry<S: Storage>(&mut self, grid: &Grid<S>) -> Result<Option<Entry>> {
        loop {
            if let Some(entry) = self.entries.next() {
                let after_start = match &self.start {
                    Bound::Included(key) => entry.key >= *key,
                    Bound::Excluded(key) => entry.key > *key,
                    Bound::Unbounded => true,
                };
                if after_start {
                    return Ok(Some(entry));
                }
                continue;
            }

            if self.index.is_none() {
                let index = read_index(grid, &self.table)?;
                self.next_block = match &self.start {
                    Bound::Included(key) | Bound::Excluded(key) => start_block(&index, key),
                    Bound::Unbounded => 0,
                };
                self.index = Some(index);
            }
            let block = match self.index.as_ref().and_then(|index| index.get(self.next_block)) {
                Some(block) => block,
                None => return Ok(None),
            };
            self.entries = read_data_block(grid, block)?.into_iter();
            self.next_block += 1;
        }
    }
}
