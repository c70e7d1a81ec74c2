//! In-memory manifest of one tree

use std::cmp::Ordering;

use crate::error::{Result, StoreError};
use crate::journal::TreeId;
use crate::segmented::{SegmentedArray, DEFAULT_SEGMENT_CAPACITY};

use super::record::{ManifestEvent, TableInfo};

/// Level entry ordered by `(key_max, id)`
#[derive(Debug, Clone)]
struct LevelTable(TableInfo);

impl PartialEq for LevelTable {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LevelTable {}

impl PartialOrd for LevelTable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LevelTable {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .key_max
            .cmp(&other.0.key_max)
            .then(self.0.id.cmp(&other.0.id))
    }
}

/// Live tables of one tree, per level
///
/// Level `L` (1-based) is `levels[L - 1]`. Tables in a level have disjoint
/// key ranges, so ordering by `key_max` also orders them by `key_min`.
#[derive(Debug, Clone)]
pub struct Manifest {
    tree: TreeId,
    levels: Vec<SegmentedArray<LevelTable>>,
}

impl Manifest {
    pub fn new(tree: TreeId, level_count: u8) -> Self {
        Self {
            tree,
            levels: (0..level_count)
                .map(|_| SegmentedArray::new(DEFAULT_SEGMENT_CAPACITY))
                .collect(),
        }
    }

    pub fn tree(&self) -> TreeId {
        self.tree
    }

    pub fn level_count(&self) -> u8 {
        self.levels.len() as u8
    }

    /// Apply a replayed or freshly emitted event
    pub fn apply(&mut self, event: &ManifestEvent) -> Result<()> {
        if event.tree() != self.tree {
            return Err(StoreError::UnknownTree(event.tree()));
        }
        match event {
            ManifestEvent::Insert { level, table, .. } => self.insert(*level, table.clone()),
            ManifestEvent::Remove { level, table, .. } => {
                self.remove(*level, table).map(|_| ())
            }
        }
    }

    /// Add a table; it must not overlap any table already in the level
    pub fn insert(&mut self, level: u8, table: TableInfo) -> Result<()> {
        let tree = self.tree;
        let id = table.id;
        if let Some(other) = self.overlapping(level, &table.key_min, &table.key_max)?.first() {
            return Err(StoreError::Corruption(format!(
                "tree {} level {}: table {} overlaps table {}",
                tree, level, id, other.id
            )));
        }
        let slot = self.level_mut(level)?;
        if slot.insert(LevelTable(table)).is_some() {
            return Err(StoreError::Corruption(format!(
                "tree {} level {}: table {} inserted twice",
                tree, level, id
            )));
        }
        Ok(())
    }

    pub fn remove(&mut self, level: u8, table: &TableInfo) -> Result<TableInfo> {
        let tree = self.tree;
        self.level_mut(level)?
            .remove_by(|probe| {
                probe
                    .0
                    .key_max
                    .cmp(&table.key_max)
                    .then(probe.0.id.cmp(&table.id))
            })
            .map(|entry| entry.0)
            .ok_or_else(|| {
                StoreError::Corruption(format!(
                    "tree {} level {}: table {} is not live",
                    tree, level, table.id
                ))
            })
    }

    /// Tables of `level` in key order
    pub fn tables(&self, level: u8) -> impl Iterator<Item = &TableInfo> + '_ {
        self.levels
            .get((level as usize).wrapping_sub(1))
            .into_iter()
            .flat_map(|array| array.iter().map(|entry| &entry.0))
    }

    pub fn table_count(&self, level: u8) -> usize {
        self.level_ref(level).map(|array| array.len()).unwrap_or(0)
    }

    pub fn total_tables(&self) -> usize {
        self.levels.iter().map(|array| array.len()).sum()
    }

    /// Tables of `level` intersecting `[key_min, key_max]`, in key order
    pub fn overlapping(
        &self,
        level: u8,
        key_min: &[u8],
        key_max: &[u8],
    ) -> Result<Vec<&TableInfo>> {
        let array = self.level_ref(level)?;
        let cursor = array.lower_bound_by(|probe| probe_before(probe, key_min));
        Ok(array
            .iter_from(cursor)
            .map(|entry| &entry.0)
            .take_while(|table| table.key_min.as_slice() <= key_max)
            .collect())
    }

    /// The table of `level` whose range contains `key`
    pub fn find(&self, level: u8, key: &[u8]) -> Option<&TableInfo> {
        let array = self.level_ref(level).ok()?;
        let cursor = array.lower_bound_by(|probe| probe_before(probe, key));
        array
            .get(cursor)
            .map(|entry| &entry.0)
            .filter(|table| table.contains_key(key))
    }

    /// Tables of `level` intersecting the range starting at `key_min`
    /// (unbounded above), in key order
    pub fn tables_from<'a>(
        &'a self,
        level: u8,
        key_min: &'a [u8],
    ) -> impl Iterator<Item = &'a TableInfo> + 'a {
        self.level_ref(level).ok().into_iter().flat_map(move |array| {
            let cursor = array.lower_bound_by(|probe| probe_before(probe, key_min));
            array.iter_from(cursor).map(|entry| &entry.0)
        })
    }

    /// Every live table with its level
    pub fn all_tables(&self) -> impl Iterator<Item = (u8, &TableInfo)> + '_ {
        self.levels.iter().enumerate().flat_map(|(index, array)| {
            array.iter().map(move |entry| (index as u8 + 1, &entry.0))
        })
    }

    /// Insert events recreating the live set
    pub fn live_events(&self) -> Vec<ManifestEvent> {
        self.all_tables()
            .map(|(level, table)| ManifestEvent::Insert {
                tree: self.tree,
                level,
                table: table.clone(),
            })
            .collect()
    }

    /// Check segment invariants and disjoint key ranges per level
    pub fn verify(&self) -> Result<()> {
        for (index, array) in self.levels.iter().enumerate() {
            let level = index + 1;
            array.verify().map_err(|reason| {
                StoreError::Corruption(format!(
                    "tree {} level {}: {}",
                    self.tree, level, reason
                ))
            })?;
            let mut previous: Option<&TableInfo> = None;
            for LevelTable(table) in array.iter() {
                if table.key_min > table.key_max {
                    return Err(StoreError::Corruption(format!(
                        "tree {} level {}: table {} has key_min > key_max",
                        self.tree, level, table.id
                    )));
                }
                if let Some(previous) = previous {
                    if previous.key_max >= table.key_min {
                        return Err(StoreError::Corruption(format!(
                            "tree {} level {}: tables {} and {} overlap",
                            self.tree, level, previous.id, table.id
                        )));
                    }
                }
                previous = Some(table);
            }
        }
        Ok(())
    }

    fn level_ref(&self, level: u8) -> Result<&SegmentedArray<LevelTable>> {
        let tree = self.tree;
        self.levels
            .get((level as usize).wrapping_sub(1))
            .ok_or_else(|| bad_level(tree, level))
    }

    fn level_mut(&mut self, level: u8) -> Result<&mut SegmentedArray<LevelTable>> {
        let tree = self.tree;
        self.levels
            .get_mut((level as usize).wrapping_sub(1))
            .ok_or_else(|| bad_level(tree, level))
    }
}

/// Orders tables whose range ends before `key` first
fn probe_before(probe: &LevelTable, key: &[u8]) -> Ordering {
    if probe.0.key_max.as_slice() < key {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

fn bad_level(tree: TreeId, level: u8) -> StoreError {
    StoreError::Corruption(format!("tree {}: level {} out of range", tree, level))
}
