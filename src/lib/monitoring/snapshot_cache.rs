//! Snapshot cache for monitoring data
//!
//! Holds the most recently published [`ConnectionSnapshot`] together with the
//! outcome of the latest poll. The poll loop writes it once per cycle, the
//! JSON API reads it on every request.
//!
//! ```text
//!   PollLoop                          HTTP handlers
//!   ────────                          ─────────────
//!      │ store() / record_failure()         │
//!      └──────────────┐                     │
//!           ┌─────────▼─────────┐           │
//!           │  SnapshotCache    │◄──────────┘ get_snapshot()
//!           │  (RwLock, swap)   │
//!           └───────────────────┘
//! ```

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

use crate::connection::ConnectionSnapshot;

/// A snapshot older than this many poll intervals is reported as stale.
const STALE_AFTER_INTERVALS: u32 = 3;

/// Point-in-time view of what the exporter currently publishes.
#[derive(Debug, Clone, Default)]
pub struct MonitoringSnapshot {
    /// When the connections were last published
    pub timestamp: Option<Instant>,
    pub connections: Option<Arc<ConnectionSnapshot>>,
    /// Error of the latest poll, cleared by the next successful one
    pub last_error: Option<String>,
}

impl MonitoringSnapshot {
    /// Check if this snapshot is stale (older than the given duration)
    pub fn is_stale(&self, max_age: Duration) -> bool {
        match self.timestamp {
            None => true,
            Some(ts) => ts.elapsed() > max_age,
        }
    }

    /// Get the age of this snapshot
    pub fn age(&self) -> Option<Duration> {
        self.timestamp.map(|ts| ts.elapsed())
    }

    /// Whether the latest poll succeeded.
    pub fn is_up(&self) -> bool {
        self.timestamp.is_some() && self.last_error.is_none()
    }
}

/// Cache of the latest published snapshot.
#[derive(Debug)]
pub struct SnapshotCache {
    snapshot: RwLock<MonitoringSnapshot>,
    refresh_interval: Duration,
}

impl SnapshotCache {
    /// Create an empty cache for a poll loop running every `refresh_interval`.
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            snapshot: RwLock::new(MonitoringSnapshot::default()),
            refresh_interval,
        }
    }

    /// Get the current snapshot.
    pub fn get_snapshot(&self) -> MonitoringSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the published connections.
    pub fn store(&self, connections: Arc<ConnectionSnapshot>) {
        let new_snapshot = MonitoringSnapshot {
            timestamp: Some(Instant::now()),
            connections: Some(connections),
            last_error: None,
        };
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = new_snapshot;
    }

    /// Record a failed poll. The published connections are left in place.
    pub fn record_failure(&self, error: impl ToString) {
        self.snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .last_error = Some(error.to_string());
    }

    /// Get the refresh interval
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Age after which the published data is considered stale.
    pub fn stale_after(&self) -> Duration {
        self.refresh_interval * STALE_AFTER_INTERVALS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionRecord;

    fn snapshot_of(names: &[&str]) -> Arc<ConnectionSnapshot> {
        Arc::new(names.iter().copied().map(ConnectionRecord::new).collect())
    }

    #[test]
    fn test_snapshot_cache_creation() {
        let cache = SnapshotCache::new(Duration::from_secs(5));

        let snapshot = cache.get_snapshot();
        assert!(snapshot.timestamp.is_none());
        assert!(snapshot.connections.is_none());
        assert!(!snapshot.is_up());
        assert!(snapshot.is_stale(cache.stale_after()));
        assert_eq!(cache.refresh_interval(), Duration::from_secs(5));
        assert_eq!(cache.stale_after(), Duration::from_secs(15));
    }

    #[test]
    fn test_store_replaces_connections() {
        let cache = SnapshotCache::new(Duration::from_secs(5));
        cache.store(snapshot_of(&["a", "b"]));
        cache.store(snapshot_of(&["c"]));

        let snapshot = cache.get_snapshot();
        let connections = snapshot.connections.clone().unwrap();
        assert_eq!(connections.len(), 1);
        assert!(connections.get("c").is_some());
        assert!(snapshot.is_up());
        assert!(snapshot.age().unwrap() < Duration::from_secs(1));
    }

    #[test]
    fn test_failure_keeps_connections() {
        let cache = SnapshotCache::new(Duration::from_secs(5));
        cache.store(snapshot_of(&["a"]));
        cache.record_failure("status command timed out after 10s");

        let snapshot = cache.get_snapshot();
        assert!(!snapshot.is_up());
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("status command timed out after 10s")
        );
        assert!(snapshot.connections.unwrap().get("a").is_some());

        cache.store(snapshot_of(&[]));
        let snapshot = cache.get_snapshot();
        assert!(snapshot.is_up());
        assert!(snapshot.last_error.is_none());
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let cache = Arc::new(SnapshotCache::new(Duration::from_secs(5)));
        let small = snapshot_of(&["a"]);
        let large = snapshot_of(&["a", "b", "c", "d"]);

        let writer_cache = Arc::clone(&cache);
        let writer = std::thread::spawn(move || {
            for i in 0..1000 {
                let next = if i % 2 == 0 { &small } else { &large };
                writer_cache.store(Arc::clone(next));
            }
        });

        let mut readers = vec![];
        for _ in 0..4 {
            let cache_ref = Arc::clone(&cache);
            readers.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    if let Some(connections) = cache_ref.get_snapshot().connections {
                        assert!(connections.len() == 1 || connections.len() == 4);
                    }
                }
            }));
        }

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
