//! Prometheus metrics for the exporter
//!
//! Two families describe the tunnels:
//!
//! - `ipsec_connection_status{connection, name, state}`
//! - `ipsec_traffic{connection, name, left_subnet, right_subnet, direction, state}`
//!
//! They must mirror exactly one snapshot, so they live in their own
//! [`Registry`] which is rebuilt for every snapshot and swapped in under a
//! single write lock. A scrape sees either the previous set of series or the
//! new one, never a cleared or half filled registry.
//!
//! The exporter health families live in a separate, long lived registry.

use std::sync::{PoisonError, RwLock};

use prometheus::{
    proto::MetricFamily, Encoder, Gauge, GaugeVec, IntCounter, Opts, Registry, TextEncoder,
};

use crate::connection::ConnectionSnapshot;

pub const CONNECTION_STATUS_METRIC: &str = "ipsec_connection_status";
pub const TRAFFIC_METRIC: &str = "ipsec_traffic";

const STATUS_LABELS: &[&str] = &["connection", "name", "state"];
const TRAFFIC_LABELS: &[&str] = &[
    "connection",
    "name",
    "left_subnet",
    "right_subnet",
    "direction",
    "state",
];

/// Connection series derived from one snapshot.
struct ConnectionSeries {
    registry: Registry,
}

impl ConnectionSeries {
    fn build(snapshot: &ConnectionSnapshot) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let status = GaugeVec::new(
            Opts::new(CONNECTION_STATUS_METRIC, "Display IPsec Connection Status"),
            STATUS_LABELS,
        )?;
        let traffic = GaugeVec::new(
            Opts::new(TRAFFIC_METRIC, "Display IPsec Traffic Info"),
            TRAFFIC_LABELS,
        )?;
        registry.register(Box::new(status.clone()))?;
        registry.register(Box::new(traffic.clone()))?;

        for connection in snapshot.iter() {
            let name = connection.name.as_str();
            let state = connection.state.as_str();

            status
                .with_label_values(&[name, name, state])
                .set(f64::from(connection.status));

            for (direction, bytes) in [("in", connection.bytes_in), ("out", connection.bytes_out)] {
                traffic
                    .with_label_values(&[
                        name,
                        name,
                        connection.left_subnet.as_str(),
                        connection.right_subnet.as_str(),
                        direction,
                        state,
                    ])
                    .set(bytes as f64);
            }
        }

        Ok(Self { registry })
    }
}

/// All metrics exposed on `/metrics`.
pub struct PrometheusMetrics {
    registry: Registry,
    pub ipsec_exporter_up: Gauge,
    pub ipsec_exporter_fetch_failures_total: IntCounter,
    pub ipsec_exporter_last_success_timestamp_seconds: Gauge,
    connections: RwLock<ConnectionSeries>,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let ipsec_exporter_up = Gauge::new(
            "ipsec_exporter_up",
            "Whether the last IPsec status poll succeeded",
        )?;
        registry.register(Box::new(ipsec_exporter_up.clone()))?;

        let ipsec_exporter_fetch_failures_total = IntCounter::new(
            "ipsec_exporter_fetch_failures_total",
            "Number of IPsec status polls that failed",
        )?;
        registry.register(Box::new(ipsec_exporter_fetch_failures_total.clone()))?;

        let ipsec_exporter_last_success_timestamp_seconds = Gauge::new(
            "ipsec_exporter_last_success_timestamp_seconds",
            "Unix time of the last successful IPsec status poll",
        )?;
        registry.register(Box::new(
            ipsec_exporter_last_success_timestamp_seconds.clone(),
        ))?;

        Ok(Self {
            registry,
            ipsec_exporter_up,
            ipsec_exporter_fetch_failures_total,
            ipsec_exporter_last_success_timestamp_seconds,
            connections: RwLock::new(ConnectionSeries::build(&ConnectionSnapshot::new())?),
        })
    }

    /// Replaces every connection series with the ones derived from `snapshot`.
    pub fn replace_connections(&self, snapshot: &ConnectionSnapshot) -> Result<(), prometheus::Error> {
        let series = ConnectionSeries::build(snapshot)?;
        *self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner) = series;
        Ok(())
    }

    /// Marks the latest poll as successful at `unix_secs`.
    pub fn record_success(&self, unix_secs: f64) {
        self.ipsec_exporter_up.set(1.0);
        self.ipsec_exporter_last_success_timestamp_seconds
            .set(unix_secs);
    }

    /// Marks the latest poll as failed. Connection series are untouched.
    pub fn record_failure(&self) {
        self.ipsec_exporter_up.set(0.0);
        self.ipsec_exporter_fetch_failures_total.inc();
    }

    /// Collects every metric family, sorted by name.
    pub fn gather(&self) -> Vec<MetricFamily> {
        let mut families = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .registry
            .gather();
        families.extend(self.registry.gather());
        families.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        families
    }

    /// Renders all metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
