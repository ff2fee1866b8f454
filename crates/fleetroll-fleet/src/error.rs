//! Fleet error types.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors raised by the fleet API or by the handles built on it.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("auto scaling group not found: {0}")]
    GroupNotFound(String),

    #[error("auto scaling group {0} has no launch template")]
    NoLaunchTemplate(String),

    #[error("an instance refresh is already in progress for {0}")]
    RefreshInProgress(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("timed out after {elapsed:?} waiting for {operation} (last status: {last_status})")]
    Timeout {
        operation: String,
        elapsed: Duration,
        last_status: String,
    },

    #[error("fleet api error: {0}")]
    Api(String),
}
