//! Status command execution
//!
//! [`StatusSource`] is the seam between the poll loop and the IPsec daemon.
//! The production implementation, [`IpsecCommand`], runs the configured
//! program (`sudo ipsec statusall` by default) and bounds it with a timeout.

use std::{future::Future, process::Stdio, time::Duration};

use tokio::process::Command;
use tracing::debug;

use crate::{config::ExporterConfig, error::CommandError};

/// Source of the raw status report.
pub trait StatusSource: Send + Sync {
    /// Returns the complete status text, or why it could not be obtained.
    fn fetch(&self) -> impl Future<Output = Result<String, CommandError>> + Send;
}

/// Runs an external status command.
#[derive(Debug, Clone)]
pub struct IpsecCommand {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl IpsecCommand {
    /// Creates a command from an argv (program first) and a timeout.
    pub fn new(argv: &[String], timeout: Duration) -> Result<Self, CommandError> {
        let (program, args) = argv.split_first().ok_or(CommandError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(CommandError::EmptyCommand);
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    pub fn from_config(config: &ExporterConfig) -> Result<Self, CommandError> {
        Self::new(config.status_command(), config.command_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl StatusSource for IpsecCommand {
    async fn fetch(&self) -> Result<String, CommandError> {
        debug!(program = %self.program, args = ?self.args, "Running status command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        // Dropping the timed out future kills the child.
        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| CommandError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(CommandError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
