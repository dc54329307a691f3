//! Publication of connection snapshots
//!
//! [`MetricsPublisher`] is the only writer of the exposed state. It is cheap to
//! clone and shared between the poll loop and the HTTP server.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tracing::debug;

use super::{prometheus_metrics::PrometheusMetrics, snapshot_cache::SnapshotCache};
use crate::{
    connection::ConnectionSnapshot,
    error::{CommandError, ExporterErrorKind},
};

#[derive(Clone)]
pub struct MetricsPublisher {
    metrics: Arc<PrometheusMetrics>,
    cache: Arc<SnapshotCache>,
}

impl MetricsPublisher {
    /// Creates a publisher for a poll loop running every `refresh_interval`.
    pub fn new(refresh_interval: Duration) -> Result<Self, ExporterErrorKind> {
        Ok(Self {
            metrics: Arc::new(PrometheusMetrics::new()?),
            cache: Arc::new(SnapshotCache::new(refresh_interval)),
        })
    }

    /// Makes `snapshot` the exposed state, replacing everything published before.
    pub fn publish(&self, snapshot: ConnectionSnapshot) -> Result<(), ExporterErrorKind> {
        let snapshot = Arc::new(snapshot);
        self.metrics.replace_connections(&snapshot)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        self.metrics.record_success(now);

        debug!(
            connections = snapshot.len(),
            established = snapshot.established_count(),
            "Published IPsec snapshot"
        );
        self.cache.store(snapshot);
        Ok(())
    }

    /// Records a failed poll while keeping the last published series.
    pub fn report_failure(&self, error: &CommandError) {
        self.metrics.record_failure();
        self.cache.record_failure(error);
    }

    pub fn metrics(&self) -> &PrometheusMetrics {
        &self.metrics
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }
}
