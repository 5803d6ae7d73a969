//! Error types for worker execution units.

use std::time::Duration;

use snafu::Snafu;

/// Worker errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub), module)]
pub enum WorkerError {
    /// The execution unit's channel is gone: it exited or was terminated.
    #[snafu(display("execution unit for module '{module}' is gone"))]
    UnitGone { module: String },

    /// A hook call did not complete within its configured timeout.
    #[snafu(display("hook call to module '{module}' timed out after {timeout:?}"))]
    CallTimeout { module: String, timeout: Duration },

    /// The unit exited while a call was in flight.
    #[snafu(display("execution unit for module '{module}' exited mid-call"))]
    UnitExited { module: String },

    /// A data-access query issued by module code failed.
    #[snafu(display("data query failed: {message}"))]
    QueryFailed { message: String },

    /// A data-access query was rejected by the proxy.
    #[snafu(display("data query denied: {reason}"))]
    QueryDenied { reason: String },

    /// A data-access query never received a response.
    #[snafu(display("data query timed out after {timeout:?}"))]
    QueryTimeout { timeout: Duration },

    /// Failed to spawn the unit's OS thread.
    #[snafu(display("failed to spawn execution unit for module '{module}': {message}"))]
    SpawnFailed { module: String, message: String },

    /// Module code reported a failure from its handler.
    #[snafu(display("module handler failed: {message}"))]
    Handler { message: String },
}

impl WorkerError {
    /// Convenience constructor for handler failures from module code.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
#[path = "error.test.rs"]
mod tests;
