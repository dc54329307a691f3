//! Status reporting from background tasks to the main loop.

use crate::error::ExporterErrorKind;

/// Why a background task stopped.
#[derive(Debug)]
pub enum State {
    /// The HTTP server exited with an error.
    MonitoringServerShutdown(ExporterErrorKind),
    /// The poll loop exited.
    PollLoopShutdown,
}

/// A message sent over the status channel.
#[derive(Debug)]
pub struct Status {
    pub state: State,
}

impl Status {
    pub fn new(state: State) -> Self {
        Self { state }
    }
}
