//! ## Poll Loop
//!
//! Drives one cycle per interval: fetch the status report, parse it, publish
//! the snapshot, then sleep. Cycles never overlap. The sleep is not anchored to
//! the start of the cycle, so the time spent fetching adds to the interval.
//!
//! A failed fetch does not touch the published connection series: the last
//! good snapshot stays visible and `ipsec_exporter_up` drops to 0.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    command_source::StatusSource,
    error::{CommandError, ExporterErrorKind},
    monitoring::MetricsPublisher,
    parser::parse_status,
    ShutdownMessage,
};

/// Result of a single poll cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// A new snapshot with this many connections is now exposed.
    Published { connections: usize },
    /// The status report could not be obtained; previous series were kept.
    FetchFailed(CommandError),
    /// The snapshot was parsed but could not be turned into metrics.
    PublishFailed(ExporterErrorKind),
}

pub struct PollLoop<S> {
    source: S,
    publisher: MetricsPublisher,
    interval: Duration,
}

impl<S: StatusSource> PollLoop<S> {
    pub fn new(source: S, publisher: MetricsPublisher, interval: Duration) -> Self {
        Self {
            source,
            publisher,
            interval,
        }
    }

    /// Runs one fetch, parse and publish pass.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let raw = match self.source.fetch().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read IPsec status, keeping previous metrics: {e}");
                self.publisher.report_failure(&e);
                return CycleOutcome::FetchFailed(e);
            }
        };

        let snapshot = parse_status(&raw);
        let connections = snapshot.len();
        debug!(connections, "Parsed IPsec status report");

        match self.publisher.publish(snapshot) {
            Ok(()) => CycleOutcome::Published { connections },
            Err(e) => {
                error!("Failed to publish IPsec metrics: {e}");
                CycleOutcome::PublishFailed(e)
            }
        }
    }

    /// Polls until a shutdown message is received.
    pub async fn run(self, mut notify_shutdown: broadcast::Receiver<ShutdownMessage>) {
        info!("Polling IPsec status every {:?}", self.interval);
        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                message = notify_shutdown.recv() => {
                    match message {
                        Ok(ShutdownMessage::ShutdownAll) | Err(_) => {
                            info!("Poll loop received shutdown signal, stopping...");
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    const ONE_TUNNEL: &str = "\
  net-a:  192.0.2.1...198.51.100.7  IKEv2, dpddelay=30s
  net-a[1]: ESTABLISHED 5 minutes ago
  net-a{1}:  INSTALLED, TUNNEL, 500 bytes_i (5 pkts), 200 bytes_o (2 pkts)
  net-a{1}:   10.0.0.0/24 === 10.1.0.0/24
";

    /// Replays scripted fetch results, then reports an empty daemon.
    #[derive(Clone)]
    struct ScriptedSource {
        results: Arc<Mutex<VecDeque<Result<String, CommandError>>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<String, CommandError>>) -> Self {
            Self {
                results: Arc::new(Mutex::new(results.into())),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl StatusSource for ScriptedSource {
        async fn fetch(&self) -> Result<String, CommandError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn poll_loop(source: ScriptedSource) -> (PollLoop<ScriptedSource>, MetricsPublisher) {
        let publisher = MetricsPublisher::new(Duration::from_secs(15)).unwrap();
        let poll_loop = PollLoop::new(source, publisher.clone(), Duration::from_millis(10));
        (poll_loop, publisher)
    }

    #[tokio::test]
    async fn test_cycle_publishes_snapshot() {
        let (poll_loop, publisher) = poll_loop(ScriptedSource::new(vec![Ok(ONE_TUNNEL.into())]));

        let outcome = poll_loop.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Published { connections: 1 }));

        let cached = publisher.cache().get_snapshot();
        let record = cached.connections.as_ref().unwrap().get("net-a").cloned().unwrap();
        assert_eq!(record.bytes_in, 500);
        assert_eq!(record.bytes_out, 200);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_snapshot() {
        let (poll_loop, publisher) = poll_loop(ScriptedSource::new(vec![
            Ok(ONE_TUNNEL.into()),
            Err(CommandError::Timeout(Duration::from_secs(10))),
        ]));

        poll_loop.run_cycle().await;
        let outcome = poll_loop.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::FetchFailed(CommandError::Timeout(_))
        ));

        let text = publisher.metrics().encode().unwrap();
        assert!(text.contains(r#"connection="net-a""#));
        assert!(text.contains("ipsec_exporter_up 0"));
    }

    #[tokio::test]
    async fn test_empty_report_clears_connections() {
        let (poll_loop, publisher) = poll_loop(ScriptedSource::new(vec![
            Ok(ONE_TUNNEL.into()),
            Ok(String::new()),
        ]));

        poll_loop.run_cycle().await;
        let outcome = poll_loop.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Published { connections: 0 }));

        let text = publisher.metrics().encode().unwrap();
        assert!(!text.contains("net-a"));
        assert!(text.contains("ipsec_exporter_up 1"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let source = ScriptedSource::new(vec![]);
        let calls = Arc::clone(&source.calls);
        let (poll_loop, _publisher) = poll_loop(source);

        let (notify_shutdown, _) = broadcast::channel(1);
        let handle = tokio::spawn(poll_loop.run(notify_shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        notify_shutdown.send(ShutdownMessage::ShutdownAll).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poll loop did not stop")
            .unwrap();
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }
}
