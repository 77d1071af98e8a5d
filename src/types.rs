/// Common types used throughout the blackboard.
///
/// Keys are dense integer handles, timestamps are seconds as `f64` with a
/// total order, and history entries pair the two with a stored value.
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Handle identifying a named value slot.
///
/// Handles are assigned densely in registration order (0, 1, 2, ...) and are
/// stable for the lifetime of the blackboard that issued them. They are
/// never recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(pub(crate) usize);

impl Key {
    /// Position of this key in registration order.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "key-{}", self.0)
    }
}

/// Point in time, in seconds.
///
/// Ordering uses [`f64::total_cmp`], so every timestamp (including NaN)
/// has a well-defined place in a history buffer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Create a timestamp from seconds.
    pub fn new(seconds: f64) -> Self {
        Self(seconds)
    }

    /// Current wall-clock time as seconds since the Unix epoch.
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// Seconds represented by this timestamp.
    pub fn as_secs(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Timestamp {
    fn from(seconds: f64) -> Self {
        Self(seconds)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(time: DateTime<Utc>) -> Self {
        Self(time.timestamp_micros() as f64 / 1_000_000.0)
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// A single timestamped value in a key's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the value was observed
    pub timestamp: Timestamp,
    /// The observed value
    pub value: Value,
}

impl HistoryEntry {
    /// Create a new history entry.
    pub fn new(timestamp: Timestamp, value: Value) -> Self {
        Self { timestamp, value }
    }
}

/// Snapshot of blackboard counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackboardStats {
    /// Number of registered keys
    pub key_count: usize,
    /// Entries held across all history buffers
    pub total_entries: usize,
    /// Remote blackboards connected via `add_external`
    pub peer_count: usize,
    /// Established (peer, key) value subscriptions
    pub value_subscriptions: usize,
    /// Key announcements waiting to be drained
    pub pending_announcements: usize,
    /// Value payloads waiting to be drained
    pub pending_values: usize,
    /// Inbound values dropped (no serializer or undecodable payload)
    pub dropped_values: u64,
}
