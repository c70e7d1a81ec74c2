//! Choosing the authoritative superblock
//!
//! `select_local` picks among this node's own slots. `select_cluster` picks
//! among the headers reported by the replicas of a cluster and refuses any
//! value that fewer than a strict majority hold.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{Result, StoreError};

use super::SuperBlockHeader;

/// Outcome of reading one local slot
#[derive(Debug)]
pub struct SlotRead {
    pub slot: u8,
    pub header: Result<SuperBlockHeader>,
}

/// Highest valid sequence among the local slots
pub fn select_local(reads: &[SlotRead]) -> Result<SuperBlockHeader> {
    let valid: Vec<(u8, &SuperBlockHeader)> = reads
        .iter()
        .filter_map(|read| match &read.header {
            Ok(header) => Some((read.slot, header)),
            Err(err) => {
                debug!(slot = read.slot, error = %err, "discarding superblock slot");
                None
            }
        })
        .collect();

    let (best_slot, best) = valid
        .iter()
        .max_by_key(|(_, header)| header.sequence)
        .copied()
        .ok_or_else(|| {
            StoreError::QuorumUnrecoverable(format!(
                "none of {} superblock slots is valid",
                reads.len()
            ))
        })?;

    for (slot, other) in &valid {
        if other.sequence == best.sequence && other.checksum != best.checksum {
            return Err(StoreError::QuorumUnrecoverable(format!(
                "slots {} and {} both hold sequence {} with different contents",
                best_slot, slot, best.sequence
            )));
        }
    }

    if let Some((slot, previous)) = valid
        .iter()
        .find(|(_, header)| header.sequence + 1 == best.sequence)
    {
        if previous.checksum != best.parent {
            warn!(
                sequence = best.sequence,
                parent_slot = slot,
                "superblock parent chain broken; higher sequence wins"
            );
        }
    }

    debug!(
        slot = best_slot,
        sequence = best.sequence,
        valid = valid.len(),
        "selected local superblock"
    );
    Ok(best.clone())
}

/// Header agreed by a strict majority of `replica_count` replicas
///
/// `reports[i]` is replica i's current header, or `None` when that replica
/// could not produce a valid one. Votes are counted per `checkpoint_id`, so
/// replica-local fields do not split a majority. Headers of another cluster
/// do not vote.
pub fn select_cluster(
    reports: &[Option<SuperBlockHeader>],
    cluster: u128,
    replica_count: u8,
) -> Result<SuperBlockHeader> {
    let majority = replica_count as usize / 2 + 1;
    let mut votes: HashMap<u32, (usize, &SuperBlockHeader)> = HashMap::new();
    for header in reports.iter().flatten() {
        if header.vsr.cluster != cluster {
            debug!(cluster = header.vsr.cluster, "ignoring report from another cluster");
            continue;
        }
        votes
            .entry(header.checkpoint_id())
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, header));
    }

    let chosen = votes
        .values()
        .filter(|(count, _)| *count >= majority)
        .map(|(_, header)| *header)
        .max_by_key(|header| header.sequence);

    match chosen {
        Some(header) => Ok(header.clone()),
        None => {
            let best_minority = votes
                .values()
                .map(|(count, header)| (header.sequence, *count))
                .max();
            Err(StoreError::QuorumUnrecoverable(format!(
                "no superblock held by {} of {} replicas ({} reports, best {:?})",
                majority,
                replica_count,
                reports.iter().flatten().count(),
                best_minority
            )))
        }
    }
}
