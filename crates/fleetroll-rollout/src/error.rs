//! Rollout error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use fleetroll_core::ConfigError;
use fleetroll_fleet::{FleetError, RefreshStatus};

/// Result type alias for rollout operations.
pub type RolloutResult<T> = Result<T, RolloutError>;

/// Errors that end a group's or an instance's part of a run.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("auto scaling group not found: {0}")]
    GroupNotFound(String),

    #[error("group {0} has no launch template")]
    NoLaunchTemplate(String),

    #[error("could not start instance refresh for {group}: {message}")]
    StartInstanceRefresh { group: String, message: String },

    #[error("timed out after {elapsed:?} waiting for {operation} (last status: {last_status})")]
    Timeout {
        operation: String,
        elapsed: Duration,
        last_status: String,
    },

    #[error("deploy to instance {instance} failed: {message}")]
    RemoteDeploy { instance: String, message: String },

    #[error("instance refresh {refresh_id} for {group} failed ({})", percent(.percentage))]
    RefreshFailed {
        group: String,
        refresh_id: String,
        percentage: Option<u8>,
    },

    #[error("instance refresh {refresh_id} for {group} ended {status} without success")]
    RefreshIncomplete {
        group: String,
        refresh_id: String,
        status: RefreshStatus,
    },

    #[error("fleet api error: {0}")]
    Fleet(FleetError),

    #[error(transparent)]
    Composite(#[from] CompositeError),

    #[error("task for {origin} panicked")]
    TaskPanicked { origin: String },
}

fn percent(p: &Option<u8>) -> String {
    match p {
        Some(p) => format!("{p}% complete"),
        None => "no progress reported".to_string(),
    }
}

impl RolloutError {
    /// Stable name of the error kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RolloutError::Configuration(_) => "ConfigurationError",
            RolloutError::GroupNotFound(_) => "GroupNotFound",
            RolloutError::NoLaunchTemplate(_) => "NoLaunchTemplate",
            RolloutError::StartInstanceRefresh { .. } => "StartInstanceRefreshError",
            RolloutError::Timeout { .. } => "Timeout",
            RolloutError::RemoteDeploy { .. } => "RemoteDeployFailure",
            RolloutError::RefreshFailed { .. } => "RefreshFailed",
            RolloutError::RefreshIncomplete { .. } => "RefreshIncomplete",
            RolloutError::Fleet(_) => "FleetError",
            RolloutError::Composite(_) => "CompositeError",
            RolloutError::TaskPanicked { .. } => "TaskPanicked",
        }
    }
}

impl From<FleetError> for RolloutError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::GroupNotFound(group) => RolloutError::GroupNotFound(group),
            FleetError::NoLaunchTemplate(group) => RolloutError::NoLaunchTemplate(group),
            FleetError::RefreshInProgress(group) => RolloutError::StartInstanceRefresh {
                group,
                message: "an instance refresh is already in progress".to_string(),
            },
            FleetError::Timeout {
                operation,
                elapsed,
                last_status,
            } => RolloutError::Timeout {
                operation,
                elapsed,
                last_status,
            },
            other => RolloutError::Fleet(other),
        }
    }
}

/// One failed item of a batch, tagged with where it came from.
#[derive(Debug)]
pub struct Failure {
    /// Group name or instance id.
    pub origin: String,
    pub error: RolloutError,
}

/// Every failure of a batch, reported together once the batch is done.
#[derive(Debug, Error)]
pub struct CompositeError {
    pub failures: Vec<Failure>,
}

impl CompositeError {
    pub fn new(failures: Vec<Failure>) -> Self {
        Self { failures }
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{}: {}", failure.origin, failure.error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_in_progress_maps_to_start_error() {
        let err = RolloutError::from(FleetError::RefreshInProgress("web".to_string()));
        assert_eq!(err.kind(), "StartInstanceRefreshError");
        assert!(err.to_string().contains("already in progress"));
    }

    #[test]
    fn fleet_timeout_keeps_last_status() {
        let err = RolloutError::from(FleetError::Timeout {
            operation: "instance i-1 to enter standby".to_string(),
            elapsed: Duration::from_secs(30),
            last_status: "Some(EnteringStandby)".to_string(),
        });
        assert_eq!(err.kind(), "Timeout");
        assert!(err.to_string().contains("EnteringStandby"));
    }

    #[test]
    fn composite_lists_every_failure() {
        let err = CompositeError::new(vec![
            Failure {
                origin: "i-1".to_string(),
                error: RolloutError::RemoteDeploy {
                    instance: "i-1".to_string(),
                    message: "exit status 1".to_string(),
                },
            },
            Failure {
                origin: "i-2".to_string(),
                error: RolloutError::NoLaunchTemplate("web".to_string()),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "2 failed: i-1: deploy to instance i-1 failed: exit status 1; \
             i-2: group web has no launch template"
        );
    }

    #[test]
    fn refresh_failed_reports_progress() {
        let err = RolloutError::RefreshFailed {
            group: "web".to_string(),
            refresh_id: "r-1".to_string(),
            percentage: Some(40),
        };
        assert_eq!(
            err.to_string(),
            "instance refresh r-1 for web failed (40% complete)"
        );
    }
}
