/// Bounded, time-ordered value history for a single key.
///
/// The buffer keeps entries sorted by timestamp (oldest first). Out-of-order
/// inserts are accepted and placed in sorted position; entries with equal
/// timestamps keep their insertion order. With a positive capacity, every
/// insert that overflows the buffer evicts the oldest entry, so eviction is
/// strictly by age and never by access pattern.
use crate::types::{HistoryEntry, Timestamp};
use crate::value::Value;
use std::collections::VecDeque;

/// Per-key history buffer.
#[derive(Debug, Clone, Default)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
    /// 0 means unbounded
    max_size: usize,
}

impl HistoryBuffer {
    /// Create an unbounded buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding at most `max_size` entries (0 = unbounded).
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_size,
        }
    }

    /// Insert a value, keeping the buffer sorted by timestamp.
    pub fn insert(&mut self, timestamp: Timestamp, value: Value) {
        // Append fast path: in-order writes are the common case.
        let newest = self.entries.back().map(|e| e.timestamp);
        if newest.is_none_or(|newest| newest <= timestamp) {
            self.entries.push_back(HistoryEntry::new(timestamp, value));
        } else {
            let idx = self.entries.partition_point(|e| e.timestamp <= timestamp);
            self.entries.insert(idx, HistoryEntry::new(timestamp, value));
        }
        self.evict();
    }

    fn evict(&mut self) {
        if self.max_size == 0 {
            return;
        }
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
        }
    }

    /// Find the entries bracketing `timestamp`.
    ///
    /// Returns `(lower, upper)`: `lower` is the entry with the greatest
    /// timestamp `<= timestamp`, `upper` the entry with the smallest
    /// timestamp `>= timestamp`. An exact hit appears on both sides.
    pub fn query_nearest(
        &self,
        timestamp: Timestamp,
    ) -> (Option<&HistoryEntry>, Option<&HistoryEntry>) {
        let after_lower = self.entries.partition_point(|e| e.timestamp <= timestamp);
        let lower = after_lower
            .checked_sub(1)
            .and_then(|idx| self.entries.get(idx));

        let first_upper = self.entries.partition_point(|e| e.timestamp < timestamp);
        let upper = self.entries.get(first_upper);

        (lower, upper)
    }

    /// Closest value to `timestamp`, preferring the past over the future.
    pub fn nearest(&self, timestamp: Timestamp) -> Option<&HistoryEntry> {
        let (lower, upper) = self.query_nearest(timestamp);
        lower.or(upper)
    }

    /// Entries with `from <= timestamp <= to`, oldest first.
    pub fn range(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> impl Iterator<Item = &HistoryEntry> + '_ {
        let start = self.entries.partition_point(|e| e.timestamp < from);
        let end = self.entries.partition_point(|e| e.timestamp <= to);
        self.entries.range(start..end.max(start))
    }

    /// The most recent entry.
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// The oldest retained entry.
    pub fn oldest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    /// All entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
