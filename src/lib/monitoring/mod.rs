//! Monitoring system for the IPsec exporter.
//!
//! Provides Prometheus metrics and a small HTTP JSON API.
//!
//! ## Architecture
//!
//! - **Publisher**: the single writer, fed by the poll loop once per cycle
//! - **Prometheus metrics**: connection series swapped per snapshot, plus exporter health
//! - **Snapshot cache**: latest snapshot and poll outcome for the JSON API
//! - **HTTP server**: read-only, serves both of the above

pub mod http_server;
pub mod prometheus_metrics;
pub mod publisher;
pub mod snapshot_cache;

pub use http_server::MonitoringServer;
pub use prometheus_metrics::{PrometheusMetrics, CONNECTION_STATUS_METRIC, TRAFFIC_METRIC};
pub use publisher::MetricsPublisher;
pub use snapshot_cache::{MonitoringSnapshot, SnapshotCache};
