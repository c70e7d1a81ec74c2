//! Journal Recovery
//!
//! Replays the records committed after a checkpoint. Reading stops at the
//! first record that is missing or fails validation; everything before it
//! is the durable journal. A failed record is never partially applied.

use tracing::{debug, warn};

use crate::error::{Result, StoreError, Unit};
use crate::storage::{Layout, Storage};

use super::{Command, CommandTag, RecordHeader, HEADER_SIZE};

/// A validated journal record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub op: u64,
    /// Header checksum; the parent of op + 1
    pub checksum: u32,
    pub command: Command,
}

/// Why a record failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidRecord {
    HeaderChecksum,
    /// Declared body size exceeds the slot
    Size { declared: u64, available: u64 },
    BodyChecksum,
    /// Parent does not match the previous record's checksum
    Parent,
    /// Checksums hold but the command does not decode
    Body,
}

/// Where replay stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStop {
    /// The next slot is unwritten or holds an op from an earlier lap
    End,
    /// Every slot of the ring was replayed
    RingEnd,
    /// The record for `op` is torn or corrupt
    Invalid {
        op: u64,
        offset: u64,
        kind: InvalidRecord,
    },
}

impl RecoveryStop {
    /// The integrity error behind an `Invalid` stop
    pub fn error(&self) -> Option<StoreError> {
        match *self {
            RecoveryStop::End | RecoveryStop::RingEnd => None,
            RecoveryStop::Invalid { op, offset, kind } => Some(match kind {
                InvalidRecord::HeaderChecksum | InvalidRecord::BodyChecksum => {
                    StoreError::Checksum {
                        unit: Unit::JournalRecord,
                        offset,
                    }
                }
                InvalidRecord::Size {
                    declared,
                    available,
                } => StoreError::TornWrite {
                    unit: Unit::JournalRecord,
                    offset,
                    declared,
                    available,
                },
                InvalidRecord::Parent => StoreError::Corruption(format!(
                    "journal record {} does not chain to op {}",
                    op,
                    op - 1
                )),
                InvalidRecord::Body => StoreError::Corruption(format!(
                    "journal record {} has an undecodable command",
                    op
                )),
            }),
        }
    }
}

/// Result of a recovery operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Checkpoint op replay started after
    pub from_op: u64,

    /// Number of records successfully recovered
    pub entries_recovered: u64,

    /// Last valid op (`from_op` when nothing was recovered)
    pub last_op: u64,

    /// Header checksum of `last_op`, the parent of the next append
    pub last_checksum: u32,

    pub stop: RecoveryStop,
}

impl RecoveryReport {
    /// Whether a torn or corrupt record cut the replay short
    pub fn was_truncated(&self) -> bool {
        matches!(self.stop, RecoveryStop::Invalid { .. })
    }
}

/// Recovered entries plus the report describing them
#[derive(Debug, Clone)]
pub struct Recovered {
    pub entries: Vec<Entry>,
    pub report: RecoveryReport,
}

/// Read every valid record after `from_op`, in op order
pub fn recover<S: Storage>(storage: &S, layout: &Layout, from_op: u64) -> Result<Recovered> {
    let mut slot = vec![0u8; layout.journal_slot_size as usize];
    let anchor = anchor(storage, layout, from_op, &mut slot)?;

    let mut parent = anchor;
    let mut entries = Vec::new();
    let mut op = from_op + 1;
    let stop = loop {
        if op > from_op + layout.journal_slot_count {
            break RecoveryStop::RingEnd;
        }
        let offset = layout.journal_slot_offset(op);
        storage.read(offset, &mut slot)?;
        match read_record(&slot, op, parent) {
            Ok(Some(entry)) => {
                parent = Some(entry.checksum);
                entries.push(entry);
                op += 1;
            }
            Ok(None) => break RecoveryStop::End,
            Err(kind) => {
                warn!(op, offset, ?kind, "journal replay stopped at invalid record");
                break RecoveryStop::Invalid { op, offset, kind };
            }
        }
    };

    let report = RecoveryReport {
        from_op,
        entries_recovered: entries.len() as u64,
        last_op: from_op + entries.len() as u64,
        last_checksum: parent.unwrap_or(0),
        stop,
    };
    debug!(
        from_op,
        recovered = report.entries_recovered,
        last_op = report.last_op,
        ?stop,
        "journal recovered"
    );
    Ok(Recovered { entries, report })
}

/// Parent expected for `from_op + 1`
///
/// Op 0 has no record and chains from zero. Otherwise the checkpointed
/// record anchors the chain, unless its slot has already been reused.
fn anchor<S: Storage>(
    storage: &S,
    layout: &Layout,
    from_op: u64,
    slot: &mut [u8],
) -> Result<Option<u32>> {
    if from_op == 0 {
        return Ok(Some(0));
    }
    let offset = layout.journal_slot_offset(from_op);
    storage.read(offset, &mut slot[..HEADER_SIZE])?;
    Ok(RecordHeader::decode(&slot[..HEADER_SIZE], offset)
        .ok()
        .filter(|header| header.op == from_op)
        .map(|header| header.checksum))
}

fn read_record(
    slot: &[u8],
    op: u64,
    parent: Option<u32>,
) -> std::result::Result<Option<Entry>, InvalidRecord> {
    if RecordHeader::is_zeroed(slot) {
        return Ok(None);
    }
    let header = RecordHeader::decode(slot, 0).map_err(|_| InvalidRecord::HeaderChecksum)?;
    if header.op != op {
        return Ok(None);
    }
    let end = HEADER_SIZE + header.size as usize;
    if end > slot.len() {
        return Err(InvalidRecord::Size {
            declared: header.size as u64,
            available: (slot.len() - HEADER_SIZE) as u64,
        });
    }
    let body = &slot[HEADER_SIZE..end];
    if crate::checksum::checksum(body) != header.checksum_body {
        return Err(InvalidRecord::BodyChecksum);
    }
    if let Some(parent) = parent {
        if header.parent != parent {
            return Err(InvalidRecord::Parent);
        }
    }
    let command = Command::decode(body).map_err(|_| InvalidRecord::Body)?;
    if CommandTag::from_u8(header.command) != Some(command.tag()) {
        return Err(InvalidRecord::Body);
    }
    Ok(Some(Entry {
        op,
        checksum: header.checksum,
        command,
    }))
}
