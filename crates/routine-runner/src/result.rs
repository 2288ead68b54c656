//! Result and error types for the routine runner.

use crate::service::ServiceError;
use thiserror::Error;

/// Result type for runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while driving a diagnostic run.
///
/// Routine failures are never errors: they are recorded as
/// [`RoutineResult`](crate::RoutineResult) values on the run state.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// `start()` was called while the suite is already running
    #[error("Run already in progress")]
    AlreadyRunning,

    /// `stop()` was called while no run is in progress
    #[error("No run in progress")]
    NotRunning,

    /// The driver owning the coordinator was dropped
    #[error("Run driver is gone")]
    DriverClosed,

    /// The run plan is malformed
    #[error("Invalid run plan: {message}")]
    InvalidPlan {
        /// Error message
        message: String,
    },

    /// The execution service could not be reached
    #[error("Execution service error: {0}")]
    Service(#[from] ServiceError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl RunnerError {
    /// Create an invalid plan error
    #[must_use]
    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Self::InvalidPlan {
            message: message.into(),
        }
    }

    /// Whether this error is a host precondition violation rather than a fault
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::AlreadyRunning | Self::NotRunning)
    }
}
