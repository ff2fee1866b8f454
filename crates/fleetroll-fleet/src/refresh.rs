//! Instance refresh status classification.
//!
//! A refresh is *completed* once it reaches any terminal status, but only
//! `Failed` is classified as a failure. Cancellations and rollbacks are
//! completed without success and get their own outcome so callers can
//! decide how to report them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of an instance refresh as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefreshStatus {
    Pending,
    InProgress,
    Successful,
    Failed,
    Cancelling,
    Cancelled,
    RollbackInProgress,
    RollbackSuccessful,
    RollbackFailed,
}

impl RefreshStatus {
    pub const ALL: [RefreshStatus; 9] = [
        RefreshStatus::Pending,
        RefreshStatus::InProgress,
        RefreshStatus::Successful,
        RefreshStatus::Failed,
        RefreshStatus::Cancelling,
        RefreshStatus::Cancelled,
        RefreshStatus::RollbackInProgress,
        RefreshStatus::RollbackSuccessful,
        RefreshStatus::RollbackFailed,
    ];

    pub fn is_completed(self) -> bool {
        !matches!(classify(self), RefreshOutcome::InProgress)
    }

    pub fn is_failed(self) -> bool {
        self == RefreshStatus::Failed
    }
}

impl fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Classification of a polled refresh status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    InProgress,
    CompletedSuccess,
    CompletedFailure,
    /// Cancelled or rolled back.
    CompletedOther,
}

pub fn classify(status: RefreshStatus) -> RefreshOutcome {
    match status {
        RefreshStatus::Pending
        | RefreshStatus::InProgress
        | RefreshStatus::Cancelling
        | RefreshStatus::RollbackInProgress => RefreshOutcome::InProgress,
        RefreshStatus::Successful => RefreshOutcome::CompletedSuccess,
        RefreshStatus::Failed => RefreshOutcome::CompletedFailure,
        RefreshStatus::Cancelled
        | RefreshStatus::RollbackSuccessful
        | RefreshStatus::RollbackFailed => RefreshOutcome::CompletedOther,
    }
}

/// One observation of an instance refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSnapshot {
    pub id: String,
    pub status: RefreshStatus,
    /// Absent early in the operation.
    pub percentage: Option<u8>,
}

impl RefreshSnapshot {
    pub fn outcome(&self) -> RefreshOutcome {
        classify(self.status)
    }
}

impl fmt::Display for RefreshSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percentage {
            Some(pct) => write!(f, "{} ({}, {pct}%)", self.id, self.status),
            None => write!(f, "{} ({})", self.id, self.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_statuses() {
        let completed: Vec<_> = RefreshStatus::ALL
            .into_iter()
            .filter(|s| s.is_completed())
            .collect();
        assert_eq!(
            completed,
            [
                RefreshStatus::Successful,
                RefreshStatus::Failed,
                RefreshStatus::Cancelled,
                RefreshStatus::RollbackSuccessful,
                RefreshStatus::RollbackFailed,
            ]
        );
    }

    #[test]
    fn only_failed_is_a_failure() {
        let failures: Vec<_> = RefreshStatus::ALL
            .into_iter()
            .filter(|s| classify(*s) == RefreshOutcome::CompletedFailure)
            .collect();
        assert_eq!(failures, [RefreshStatus::Failed]);
        assert!(RefreshStatus::Failed.is_failed());
        assert!(!RefreshStatus::RollbackFailed.is_failed());
    }

    #[test]
    fn cancellations_and_rollbacks_are_other() {
        for status in [
            RefreshStatus::Cancelled,
            RefreshStatus::RollbackSuccessful,
            RefreshStatus::RollbackFailed,
        ] {
            assert_eq!(classify(status), RefreshOutcome::CompletedOther);
        }
        assert_eq!(classify(RefreshStatus::Successful), RefreshOutcome::CompletedSuccess);
        assert_eq!(classify(RefreshStatus::Cancelling), RefreshOutcome::InProgress);
    }

    #[test]
    fn snapshot_display() {
        let snap = RefreshSnapshot {
            id: "r-1".to_string(),
            status: RefreshStatus::InProgress,
            percentage: Some(40),
        };
        assert_eq!(snap.to_string(), "r-1 (InProgress, 40%)");
    }
}
