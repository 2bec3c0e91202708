//! Ordered pending queue with a retirement floor.
//!
//! # Invariants
//!
//! - **Ordered, unique**: entries are keyed by sequence number; at most one
//!   entry per number.
//! - **Floor is non-decreasing**: once a sequence number has been emitted or
//!   retired, it and everything below it are refused on insert.
//! - **Floor advances only on consumption**: eviction of superseded entries
//!   does not move it. Only [`SequenceQueue::clear`] resets it.

use std::collections::BTreeMap;
use std::ops::Bound;

/// Result of [`SequenceQueue::insert`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// An entry with this sequence number is already queued.
    AlreadyQueued,
    /// Sequence number is at or below the highest consumed number.
    AtOrBelowFloor { floor: u64 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Clone, Debug)]
pub struct SequenceQueue<T> {
    entries: BTreeMap<u64, T>,
    /// Highest sequence number consumed (emitted or retired) on this stream.
    floor: Option<u64>,
}

impl<T> Default for SequenceQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SequenceQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            floor: None,
        }
    }

    pub fn insert(&mut self, seq: u64, entry: T) -> Admission {
        if let Some(floor) = self.floor {
            if seq <= floor {
                return Admission::AtOrBelowFloor { floor };
            }
        }
        if self.entries.contains_key(&seq) {
            return Admission::AlreadyQueued;
        }
        self.entries.insert(seq, entry);
        Admission::Admitted
    }

    pub fn peek_lowest(&self) -> Option<(u64, &T)> {
        self.entries.iter().next().map(|(k, v)| (*k, v))
    }

    /// Remove the lowest entry and raise the floor to its sequence number.
    pub fn pop_lowest(&mut self) -> Option<(u64, T)> {
        let (seq, entry) = self.entries.pop_first()?;
        self.raise_floor(seq);
        Some((seq, entry))
    }

    pub fn get_mut(&mut self, seq: u64) -> Option<&mut T> {
        self.entries.get_mut(&seq)
    }

    /// Lowest entry strictly above `after` (or the lowest overall for `None`).
    pub fn next_after(&self, after: Option<u64>) -> Option<(u64, &T)> {
        let lower = match after {
            Some(s) => Bound::Excluded(s),
            None => Bound::Unbounded,
        };
        self.entries
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(k, v)| (*k, v))
    }

    /// Drop every entry `<= seq` and raise the floor to `seq`.
    ///
    /// Returns how many queued entries were dropped.
    pub fn retire_through(&mut self, seq: u64) -> usize {
        let keep = self.entries.split_off(&seq.saturating_add(1));
        let dropped = std::mem::replace(&mut self.entries, keep).len();
        if seq == u64::MAX {
            // split_off(MAX) kept the MAX entry itself.
            let extra = self.entries.remove(&u64::MAX).is_some() as usize;
            self.raise_floor(seq);
            return dropped + extra;
        }
        self.raise_floor(seq);
        dropped
    }

    /// Drop every entry strictly below `seq`. The floor is not moved.
    pub fn evict_below(&mut self, seq: u64) -> usize {
        let keep = self.entries.split_off(&seq);
        std::mem::replace(&mut self.entries, keep).len()
    }

    /// Keep only entries for which `keep` returns true. The floor is not
    /// moved. Returns the number dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(u64, &T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|seq, entry| keep(*seq, entry));
        before - self.entries.len()
    }

    /// Empty the queue and forget the floor (full reset).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.floor = None;
    }

    pub fn highest(&self) -> Option<u64> {
        self.entries.keys().next_back().copied()
    }

    pub fn floor(&self) -> Option<u64> {
        self.floor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.entries.contains_key(&seq)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn sequence_numbers(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    fn raise_floor(&mut self, seq: u64) {
        self.floor = Some(self.floor.map_or(seq, |f| f.max(seq)));
    }
}
