//! ## Error Module
//!
//! Defines the error types used across the exporter.
//!
//! - [`CommandError`] covers a single failed run of the status command. It is
//!   never fatal: the poll loop reports it and moves on to the next cycle.
//! - [`ExporterErrorKind`] covers startup and runtime failures of the process
//!   itself (bad configuration, unable to bind the listener, ...).
use std::{fmt, io, net::SocketAddr, time::Duration};

/// Failure to obtain the status report.
#[derive(Debug)]
pub enum CommandError {
    /// No program was configured.
    EmptyCommand,
    /// The program could not be started or its output could not be read.
    Spawn(io::Error),
    /// The program did not finish in time and was killed.
    Timeout(Duration),
    /// The program exited unsuccessfully.
    NonZeroExit { code: Option<i32>, stderr: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::EmptyCommand => write!(f, "status command is empty"),
            CommandError::Spawn(e) => write!(f, "failed to run status command: {e}"),
            CommandError::Timeout(after) => {
                write!(f, "status command timed out after {after:?}")
            }
            CommandError::NonZeroExit { code, stderr } => {
                match code {
                    Some(code) => write!(f, "status command exited with code {code}")?,
                    None => write!(f, "status command was terminated by a signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CommandError {
    fn from(e: io::Error) -> Self {
        CommandError::Spawn(e)
    }
}

/// Errors that stop the exporter.
#[derive(Debug)]
pub enum ExporterErrorKind {
    /// Configuration could not be loaded or is invalid.
    Configuration(String),
    /// The metrics listener could not be bound.
    Bind { address: SocketAddr, source: io::Error },
    /// A metric could not be created or registered.
    Metrics(prometheus::Error),
    /// The HTTP server stopped with an error.
    MonitoringServer(io::Error),
}

impl fmt::Display for ExporterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExporterErrorKind::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
            ExporterErrorKind::Bind { address, source } => {
                write!(f, "failed to bind metrics listener on {address}: {source}")
            }
            ExporterErrorKind::Metrics(e) => write!(f, "metrics registry error: {e}"),
            ExporterErrorKind::MonitoringServer(e) => write!(f, "monitoring server error: {e}"),
        }
    }
}

impl std::error::Error for ExporterErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExporterErrorKind::Configuration(_) => None,
            ExporterErrorKind::Bind { source, .. } => Some(source),
            ExporterErrorKind::Metrics(e) => Some(e),
            ExporterErrorKind::MonitoringServer(e) => Some(e),
        }
    }
}

impl From<prometheus::Error> for ExporterErrorKind {
    fn from(e: prometheus::Error) -> Self {
        ExporterErrorKind::Metrics(e)
    }
}

impl From<ext_config::ConfigError> for ExporterErrorKind {
    fn from(e: ext_config::ConfigError) -> Self {
        ExporterErrorKind::Configuration(e.to_string())
    }
}
