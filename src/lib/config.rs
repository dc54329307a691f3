//! ## Configuration Module
//!
//! Defines [`ExporterConfig`], the immutable configuration of the exporter.
//!
//! The configuration is built once at startup from an optional TOML file and
//! command line overrides, validated, and then passed explicitly to the poll
//! loop and the monitoring server.
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::ExporterErrorKind;

pub const DEFAULT_LISTEN_PORT: u16 = 9754;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

/// Configuration for the exporter.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    /// Address the metrics endpoint is exposed on.
    #[serde(default = "default_listen_address")]
    listen_address: IpAddr,
    /// Port the metrics endpoint is exposed on.
    #[serde(default = "default_listen_port")]
    listen_port: u16,
    /// Seconds to wait between two status polls.
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,
    /// Program and arguments printing the IPsec status report.
    #[serde(default = "default_status_command")]
    status_command: Vec<String>,
    /// Seconds after which a running status command is killed.
    #[serde(default = "default_command_timeout_secs")]
    command_timeout_secs: u64,
    /// Optional log file, in addition to stdout.
    #[serde(default)]
    log_file: Option<PathBuf>,
}

fn default_listen_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_status_command() -> Vec<String> {
    ["sudo", "ipsec", "statusall"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            poll_interval_secs: default_poll_interval_secs(),
            status_command: default_status_command(),
            command_timeout_secs: default_command_timeout_secs(),
            log_file: None,
        }
    }
}

impl ExporterConfig {
    /// Creates a new [`ExporterConfig`] listening on `listen_address:listen_port`.
    pub fn new(listen_address: IpAddr, listen_port: u16, poll_interval_secs: u64) -> Self {
        Self {
            listen_address,
            listen_port,
            poll_interval_secs,
            ..Self::default()
        }
    }

    /// Replaces the status command.
    pub fn with_status_command(mut self, status_command: Vec<String>) -> Self {
        self.status_command = status_command;
        self
    }

    /// Replaces the status command timeout.
    pub fn with_command_timeout_secs(mut self, command_timeout_secs: u64) -> Self {
        self.command_timeout_secs = command_timeout_secs;
        self
    }

    /// Checks the values that cannot be expressed by the types alone.
    pub fn validate(&self) -> Result<(), ExporterErrorKind> {
        if self.poll_interval_secs == 0 {
            return Err(ExporterErrorKind::Configuration(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(ExporterErrorKind::Configuration(
                "command_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.status_command.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(ExporterErrorKind::Configuration(
                "status_command must name a program".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the socket address of the metrics endpoint.
    pub fn monitoring_address(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.listen_port)
    }

    /// Returns the delay between two polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the status command as program followed by its arguments.
    pub fn status_command(&self) -> &[String] {
        &self.status_command
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}
