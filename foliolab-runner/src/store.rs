//! Snapshot store — per-key history of portfolio snapshots.
//!
//! Callers own the store and pass it where it is needed; nothing in the
//! engine reaches for it implicitly. Retention is enforced on every insert:
//! snapshots older than `max_age_days` (relative to the newest one) go first,
//! then the oldest beyond `max_snapshots`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use foliolab_core::scenario::PortfolioSnapshot;

use crate::config::StoreConfig;

/// A snapshot with the moment it was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub taken_at: DateTime<Utc>,
    pub snapshot: PortfolioSnapshot,
}

/// Key → time-ordered snapshot list with explicit eviction.
pub trait SnapshotStore: Send + Sync {
    /// Insert a record and apply retention. Returns how many records were evicted.
    fn push(&mut self, key: &str, record: SnapshotRecord) -> usize;

    fn latest(&self, key: &str) -> Option<&SnapshotRecord>;

    /// Oldest first.
    fn history(&self, key: &str) -> &[SnapshotRecord];

    /// Apply retention for `key` as of `now`. Returns how many records were evicted.
    fn evict(&mut self, key: &str, now: DateTime<Utc>) -> usize;

    fn keys(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotStore {
    config: StoreConfig,
    entries: BTreeMap<String, Vec<SnapshotRecord>>,
}

impl InMemorySnapshotStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn push(&mut self, key: &str, record: SnapshotRecord) -> usize {
        let now = record.taken_at;
        let list = self.entries.entry(key.to_string()).or_default();
        // Keep time order even if records arrive out of order; equal
        // timestamps keep insertion order.
        let at = list.partition_point(|r| r.taken_at <= record.taken_at);
        list.insert(at, record);
        let newest = list.last().map(|r| r.taken_at).unwrap_or(now);
        self.evict(key, newest)
    }

    fn latest(&self, key: &str) -> Option<&SnapshotRecord> {
        self.entries.get(key).and_then(|list| list.last())
    }

    fn history(&self, key: &str) -> &[SnapshotRecord] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    fn evict(&mut self, key: &str, now: DateTime<Utc>) -> usize {
        let Some(list) = self.entries.get_mut(key) else {
            return 0;
        };
        let before = list.len();

        if self.config.max_age_days > 0 {
            let cutoff = now - Duration::days(i64::from(self.config.max_age_days));
            list.retain(|r| r.taken_at >= cutoff);
        }
        let max = self.config.max_snapshots.max(1);
        if list.len() > max {
            list.drain(..list.len() - max);
        }

        let evicted = before - list.len();
        if evicted > 0 {
            debug!(key, evicted, remaining = list.len(), "snapshots evicted");
        }
        evicted
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}
