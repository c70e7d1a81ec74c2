//! Manifest Log
//!
//! Append-only event log inside one half of the manifest zone. Appends are
//! buffered in memory until `flush`; the superblock pointer written at the
//! next checkpoint makes them durable.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::{Exhausted, Result, StoreError, Unit};
use crate::journal::TreeId;
use crate::storage::{Layout, Storage};
use crate::superblock::ManifestPointer;

use super::record::{ManifestEvent, RECORD_HEADER_SIZE};

/// Where replay stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStop {
    /// Reached the requested limit
    Limit,
    /// Zero-length record: the unwritten tail of the half
    End,
    /// Record at `offset` is short or fails validation
    Invalid { offset: u64 },
}

/// Result of replaying one half
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub half: u32,
    pub events: usize,
    /// Bytes of valid records, relative to the half
    pub end: u64,
    pub stop: ReplayStop,
}

/// The manifest log of the whole forest
#[derive(Debug)]
pub struct ManifestLog<S: Storage> {
    storage: S,
    layout: Layout,
    /// Half receiving appends
    half: u32,
    /// Half named by the last durable superblock
    durable_half: u32,
    /// Bytes written to the active half
    written: u64,
    /// Encoded records not yet written
    pending: Vec<u8>,
    pending_events: usize,
}

impl<S: Storage> ManifestLog<S> {
    /// An empty log in half 0
    pub fn format(storage: S, layout: Layout) -> Self {
        Self {
            storage,
            layout,
            half: 0,
            durable_half: 0,
            written: 0,
            pending: Vec::new(),
            pending_events: 0,
        }
    }

    /// Replay the log named by a durable superblock pointer
    ///
    /// The superblock vouches for every byte up to `pointer.length`, so a
    /// replay that stops short of it is corruption, not a torn tail.
    pub fn open(
        storage: S,
        layout: Layout,
        pointer: ManifestPointer,
    ) -> Result<(Self, Vec<ManifestEvent>)> {
        let (events, report) = Self::replay(&storage, &layout, pointer.half, pointer.length)?;
        if report.end != pointer.length {
            return Err(StoreError::Checksum {
                unit: Unit::ManifestRecord,
                offset: layout.manifest_half_offset(pointer.half) + report.end,
            });
        }
        info!(
            half = pointer.half,
            length = pointer.length,
            events = events.len(),
            "manifest log replayed"
        );
        let log = Self {
            storage,
            layout,
            half: pointer.half,
            durable_half: pointer.half,
            written: pointer.length,
            pending: Vec::new(),
            pending_events: 0,
        };
        Ok((log, events))
    }

    /// Read events forward from the start of `half`, up to `limit` bytes,
    /// stopping at the first short or invalid record
    pub fn replay(
        storage: &S,
        layout: &Layout,
        half: u32,
        limit: u64,
    ) -> Result<(Vec<ManifestEvent>, ReplayReport)> {
        let limit = limit.min(layout.manifest_half_size());
        let base = layout.manifest_half_offset(half);
        let mut region = vec![0u8; limit as usize];
        storage.read(base, &mut region)?;

        let mut events = Vec::new();
        let mut offset = 0usize;
        let stop = loop {
            if offset >= region.len() {
                break ReplayStop::Limit;
            }
            let rest = &region[offset..];
            let unwritten = rest.len() >= RECORD_HEADER_SIZE
                && rest[..RECORD_HEADER_SIZE].iter().all(|b| *b == 0);
            if unwritten {
                break ReplayStop::End;
            }
            match ManifestEvent::decode(rest, base + offset as u64) {
                Ok((event, len)) => {
                    events.push(event);
                    offset += len;
                }
                Err(err) => {
                    warn!(
                        half,
                        offset,
                        error = %err,
                        "manifest replay stopped at invalid record"
                    );
                    break ReplayStop::Invalid {
                        offset: offset as u64,
                    };
                }
            }
        };

        let report = ReplayReport {
            half,
            events: events.len(),
            end: offset as u64,
            stop,
        };
        Ok((events, report))
    }

    /// Buffer an event; durable once flushed and captured by a checkpoint
    pub fn append(&mut self, event: &ManifestEvent) -> Result<()> {
        let record = event.encode();
        let used = self.written + self.pending.len() as u64;
        if used + record.len() as u64 > self.layout.manifest_half_size() {
            return Err(StoreError::Exhausted(Exhausted::ManifestFull));
        }
        self.pending.extend_from_slice(&record);
        self.pending_events += 1;
        Ok(())
    }

    /// Write buffered events and sync
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let offset = self.layout.manifest_half_offset(self.half) + self.written;
        self.storage.write(offset, &self.pending)?;
        self.storage.sync()?;
        debug!(
            half = self.half,
            events = self.pending_events,
            bytes = self.pending.len(),
            "manifest log flushed"
        );
        self.written += self.pending.len() as u64;
        self.pending.clear();
        self.pending_events = 0;
        Ok(())
    }

    /// Whether the active half is more than half full
    pub fn wants_compaction(&self) -> bool {
        self.wants_compaction_with(0)
    }

    /// Whether the active half would be more than half full after
    /// `incoming` more bytes of records
    pub fn wants_compaction_with(&self, incoming: u64) -> bool {
        let used = self.written + self.pending.len() as u64 + incoming;
        used * 2 > self.layout.manifest_half_size()
    }

    /// Whether the inactive half is free to receive a compacted log
    pub fn can_compact(&self) -> bool {
        self.half == self.durable_half
    }

    /// Rewrite the log as `live` into the inactive half and append there
    /// from now on
    ///
    /// The durable superblock keeps naming the old half until the next
    /// checkpoint, so the old half must not have been replaced already.
    pub fn compact(&mut self, live: &[ManifestEvent]) -> Result<()> {
        if !self.can_compact() {
            return Err(StoreError::Corruption(
                "manifest compaction before the previous switch is durable".to_string(),
            ));
        }
        let mut image = Vec::new();
        for event in live {
            image.extend_from_slice(&event.encode());
        }
        if image.len() as u64 > self.layout.manifest_half_size() {
            return Err(StoreError::Exhausted(Exhausted::ManifestFull));
        }

        let target = 1 - self.half;
        if !image.is_empty() {
            self.storage
                .write(self.layout.manifest_half_offset(target), &image)?;
        }
        self.storage.sync()?;

        info!(
            from = self.half,
            to = target,
            before = self.written + self.pending.len() as u64,
            after = image.len(),
            "manifest log compacted"
        );
        self.half = target;
        self.written = image.len() as u64;
        self.pending.clear();
        self.pending_events = 0;
        Ok(())
    }

    /// Pointer to the flushed log, for the next superblock
    pub fn pointer(&self, op: u64) -> ManifestPointer {
        ManifestPointer {
            half: self.half,
            length: self.written,
            op,
        }
    }

    /// The superblock naming `pointer` is durable
    pub fn checkpoint_durable(&mut self, pointer: ManifestPointer) {
        self.durable_half = pointer.half;
    }

    pub fn half(&self) -> u32 {
        self.half
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn pending_events(&self) -> usize {
        self.pending_events
    }
}

/// Drop insert/remove pairs that cancel out
///
/// Replaying the result from empty yields the same live set as replaying
/// `events`. Surviving events keep their relative order.
pub fn compact_events(events: &[ManifestEvent]) -> Vec<ManifestEvent> {
    let mut keep = vec![true; events.len()];
    let mut inserted: HashMap<(TreeId, u8, u64), usize> = HashMap::new();
    for (index, event) in events.iter().enumerate() {
        let key = (event.tree(), event.level(), event.table().id);
        match event {
            ManifestEvent::Insert { .. } => {
                inserted.insert(key, index);
            }
            ManifestEvent::Remove { .. } => {
                if let Some(insert) = inserted.remove(&key) {
                    keep[insert] = false;
                    keep[index] = false;
                }
            }
        }
    }
    events
        .iter()
        .zip(keep)
        .filter(|(_, keep)| *keep)
        .map(|(event, _)| event.clone())
        .collect()
}
