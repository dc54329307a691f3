//! ## IPsec Exporter
//!
//! Periodically reads the output of `ipsec statusall` and republishes
//! per-tunnel state and byte counters as Prometheus gauges.
//!
//! The central component is the [`IpsecExporter`] struct. Its `start` method
//! binds the monitoring server, spawns the poll loop and waits for Ctrl+C or for
//! a background task to fail. The work itself is split across sub-modules:
//! `command_source` runs the status command, `parser` turns its text into a
//! [`connection::ConnectionSnapshot`], `monitoring` exposes the snapshot and
//! `poll_loop` ties them together.
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    command_source::IpsecCommand,
    config::ExporterConfig,
    error::ExporterErrorKind,
    monitoring::{MetricsPublisher, MonitoringServer},
    poll_loop::PollLoop,
    status::{State, Status},
};

pub mod command_source;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod monitoring;
pub mod parser;
pub mod poll_loop;
pub mod status;

pub const SHUTDOWN_BROADCAST_CAPACITY: usize = 16;

/// How long to wait for background tasks after a shutdown was requested.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Message broadcast to background tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMessage {
    ShutdownAll,
}

/// Represent the IPsec exporter process.
#[derive(Debug)]
pub struct IpsecExporter {
    config: ExporterConfig,
    notify_shutdown: broadcast::Sender<ShutdownMessage>,
}

#[cfg_attr(not(test), hotpath::measure_all)]
impl IpsecExporter {
    /// Creates a new [`IpsecExporter`] instance.
    pub fn new(config: ExporterConfig) -> Self {
        let (notify_shutdown, _) =
            broadcast::channel::<ShutdownMessage>(SHUTDOWN_BROADCAST_CAPACITY);
        Self {
            config,
            notify_shutdown,
        }
    }

    /// Requests a graceful shutdown of a running exporter.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(ShutdownMessage::ShutdownAll);
    }

    /// Starts the exporter and runs until Ctrl+C or until a background task fails.
    ///
    /// Configuration and bind errors are returned before anything is spawned.
    pub async fn start(&self) -> Result<(), ExporterErrorKind> {
        self.config.validate()?;
        info!(
            "IPsec exporter starting, polling `{}` every {:?}",
            self.config.status_command().join(" "),
            self.config.poll_interval()
        );

        let source = IpsecCommand::from_config(&self.config)
            .map_err(|e| ExporterErrorKind::Configuration(e.to_string()))?;
        let publisher = MetricsPublisher::new(self.config.poll_interval())?;
        let monitoring_server =
            MonitoringServer::bind(self.config.monitoring_address(), publisher.clone()).await?;

        let (status_sender, status_receiver) = async_channel::unbounded::<Status>();

        let mut notify_shutdown_monitoring = self.notify_shutdown.subscribe();
        let shutdown_signal = async move {
            let _ = notify_shutdown_monitoring.recv().await;
        };
        let server_status_sender = status_sender.clone();
        let server_handle = tokio::spawn(async move {
            if let Err(e) = monitoring_server.run(shutdown_signal).await {
                error!("Monitoring server error: {e}");
                let _ = server_status_sender
                    .send(Status::new(State::MonitoringServerShutdown(e)))
                    .await;
            }
        });

        let poll_loop = PollLoop::new(source, publisher, self.config.poll_interval());
        let notify_shutdown_poll = self.notify_shutdown.subscribe();
        let poll_handle = tokio::spawn(async move {
            poll_loop.run(notify_shutdown_poll).await;
            let _ = status_sender
                .send(Status::new(State::PollLoopShutdown))
                .await;
        });

        let mut result = Ok(());
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, initiating graceful shutdown...");
                    break;
                }
                message = status_receiver.recv() => {
                    match message {
                        Ok(status) => match status.state {
                            State::MonitoringServerShutdown(e) => {
                                warn!("Monitoring server stopped, initiating full shutdown.");
                                result = Err(e);
                                break;
                            }
                            State::PollLoopShutdown => {
                                info!("Poll loop stopped, initiating full shutdown.");
                                break;
                            }
                        },
                        Err(_) => break,
                    }
                }
            }
        }

        self.shutdown();
        for handle in [server_handle, poll_handle] {
            match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Background task failed: {e}"),
                Err(_) => warn!("Background task did not stop within {SHUTDOWN_GRACE_PERIOD:?}"),
            }
        }
        info!("IPsec exporter shutdown complete.");
        result
    }
}

impl Drop for IpsecExporter {
    fn drop(&mut self) {
        let _ = self.notify_shutdown.send(ShutdownMessage::ShutdownAll);
    }
}
