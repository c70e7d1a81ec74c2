//! SegmentedArray implementation

use std::cmp::Ordering;

use super::DEFAULT_SEGMENT_CAPACITY;

/// Position of an element: segment index plus index inside the segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub segment: usize,
    pub index: usize,
}

/// Sorted set of `T` stored across fixed-capacity segments
#[derive(Debug, Clone)]
pub struct SegmentedArray<T> {
    segments: Vec<Vec<T>>,
    capacity: usize,
    len: usize,
}

impl<T: Ord> Default for SegmentedArray<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_CAPACITY)
    }
}

impl<T: Ord> SegmentedArray<T> {
    /// Create an empty array whose segments hold up to `capacity` elements
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 4, "segment capacity must be at least 4");
        Self {
            segments: Vec::new(),
            capacity,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Segments drained below this are rebalanced
    pub fn low_watermark(&self) -> usize {
        self.capacity / 4
    }

    /// Segments filled past this are split
    pub fn high_watermark(&self) -> usize {
        self.capacity
    }

    pub fn first(&self) -> Option<&T> {
        self.segments.first().and_then(|s| s.first())
    }

    pub fn last(&self) -> Option<&T> {
        self.segments.last().and_then(|s| s.last())
    }

    /// Insert in order; an equal element is replaced and returned
    pub fn insert(&mut self, value: T) -> Option<T> {
        if self.segments.is_empty() {
            self.segments.push(Vec::with_capacity(self.capacity));
        }

        let segment = self.segment_for(|probe| probe.cmp(&value));
        let target = &mut self.segments[segment];
        match target.binary_search(&value) {
            Ok(index) => Some(std::mem::replace(&mut target[index], value)),
            Err(index) => {
                target.insert(index, value);
                let overfull = target.len() > self.capacity;
                self.len += 1;
                if overfull {
                    self.split(segment);
                }
                None
            }
        }
    }

    /// Remove the element equal to `value`
    pub fn remove(&mut self, value: &T) -> Option<T> {
        self.remove_by(|probe| probe.cmp(value))
    }

    /// Remove the element for which `compare` returns `Equal`
    ///
    /// `compare` orders an element relative to the target and must be
    /// consistent with the array order.
    pub fn remove_by<F>(&mut self, mut compare: F) -> Option<T>
    where
        F: FnMut(&T) -> Ordering,
    {
        if self.segments.is_empty() {
            return None;
        }
        let segment = self.segment_for(&mut compare);
        let index = self.segments[segment].binary_search_by(&mut compare).ok()?;
        let removed = self.segments[segment].remove(index);
        self.len -= 1;
        self.rebalance_after_remove(segment);
        Some(removed)
    }

    /// Cursor at the first element not ordered before the target
    pub fn lower_bound_by<F>(&self, mut compare: F) -> Cursor
    where
        F: FnMut(&T) -> Ordering,
    {
        if self.segments.is_empty() {
            return Cursor {
                segment: 0,
                index: 0,
            };
        }
        let segment = self.segment_for(&mut compare);
        let index =
            self.segments[segment].partition_point(|probe| compare(probe) == Ordering::Less);
        self.normalize(Cursor { segment, index })
    }

    /// Exact lookup
    pub fn find_by<F>(&self, mut compare: F) -> Option<&T>
    where
        F: FnMut(&T) -> Ordering,
    {
        let cursor = self.lower_bound_by(&mut compare);
        self.get(cursor).filter(|probe| compare(probe) == Ordering::Equal)
    }

    pub fn get(&self, cursor: Cursor) -> Option<&T> {
        self.segments.get(cursor.segment)?.get(cursor.index)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.find_by(|probe| probe.cmp(value)).is_some()
    }

    /// Ordered iteration, forwards or (with `.rev()`) backwards
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.segments.iter().flatten()
    }

    /// Forward iteration starting at `cursor`
    pub fn iter_from(&self, cursor: Cursor) -> impl Iterator<Item = &T> + '_ {
        let (head, tail): (&[T], &[Vec<T>]) = match self.segments.get(cursor.segment) {
            Some(segment) => (
                &segment[cursor.index.min(segment.len())..],
                &self.segments[cursor.segment + 1..],
            ),
            None => (&[], &[]),
        };
        head.iter().chain(tail.iter().flatten())
    }

    /// Backward iteration over the elements strictly before `cursor`
    pub fn iter_before(&self, cursor: Cursor) -> impl Iterator<Item = &T> + '_ {
        let (head, tail): (&[T], &[Vec<T>]) = match self.segments.get(cursor.segment) {
            Some(segment) => (
                &segment[..cursor.index.min(segment.len())],
                &self.segments[..cursor.segment],
            ),
            None => (&[], &self.segments[..]),
        };
        head.iter().rev().chain(tail.iter().rev().flat_map(|s| s.iter().rev()))
    }

    /// Check ordering and watermarks; returns a description of the first
    /// violation
    pub fn verify(&self) -> Result<(), String> {
        let mut count = 0;
        let mut previous: Option<&T> = None;
        for (i, segment) in self.segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(format!("segment {} is empty", i));
            }
            if segment.len() > self.high_watermark() {
                return Err(format!("segment {} over capacity: {}", i, segment.len()));
            }
            if self.segments.len() > 1 && segment.len() < self.low_watermark() {
                return Err(format!("segment {} under watermark: {}", i, segment.len()));
            }
            for value in segment {
                if let Some(prev) = previous {
                    if prev >= value {
                        return Err(format!("order violated in segment {}", i));
                    }
                }
                previous = Some(value);
                count += 1;
            }
        }
        if count != self.len {
            return Err(format!("len {} but {} elements stored", self.len, count));
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Segment that holds (or would hold) the target
    fn segment_for<F>(&self, mut compare: F) -> usize
    where
        F: FnMut(&T) -> Ordering,
    {
        let index = self.segments.partition_point(|segment| match segment.last() {
            Some(last) => compare(last) == Ordering::Less,
            None => false,
        });
        index.min(self.segments.len().saturating_sub(1))
    }

    /// Move a past-the-end cursor to the start of the next segment
    fn normalize(&self, cursor: Cursor) -> Cursor {
        match self.segments.get(cursor.segment) {
            Some(segment)
                if cursor.index >= segment.len() && cursor.segment + 1 < self.segments.len() =>
            {
                Cursor {
                    segment: cursor.segment + 1,
                    index: 0,
                }
            }
            _ => cursor,
        }
    }

    fn split(&mut self, segment: usize) {
        let half = self.segments[segment].len() / 2;
        let mut upper = Vec::with_capacity(self.capacity);
        upper.extend(self.segments[segment].drain(half..));
        self.segments.insert(segment + 1, upper);
    }

    fn rebalance_after_remove(&mut self, segment: usize) {
        let len = self.segments[segment].len();
        if len == 0 && self.segments.len() == 1 {
            self.segments.clear();
            return;
        }
        if self.segments.len() == 1 || len >= self.low_watermark() {
            if len == 0 {
                self.segments.remove(segment);
            }
            return;
        }

        // Pair the drained segment with a neighbour, lower index first.
        let (left, right) = if segment + 1 < self.segments.len() {
            (segment, segment + 1)
        } else {
            (segment - 1, segment)
        };
        let combined = self.segments[left].len() + self.segments[right].len();

        if combined <= self.capacity / 2 {
            let moved = std::mem::take(&mut self.segments[right]);
            self.segments[left].extend(moved);
            self.segments.remove(right);
        } else {
            // Even out the pair so both land well above the low watermark.
            let target_left = combined / 2;
            let left_len = self.segments[left].len();
            if left_len < target_left {
                let take = target_left - left_len;
                let moved: Vec<T> = self.segments[right].drain(..take).collect();
                self.segments[left].extend(moved);
            } else {
                let give = left_len - target_left;
                let moved: Vec<T> = self.segments[left].drain(left_len - give..).collect();
                self.segments[right].splice(0..0, moved);
            }
        }
    }
}

impl<T: Ord> FromIterator<T> for SegmentedArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut array = Self::default();
        for value in iter {
            array.insert(value);
        }
        array
    }
}
