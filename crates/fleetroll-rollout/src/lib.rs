//! fleetroll-rollout: rolling deployments across auto scaling groups.
//!
//! Publishes a new image, updates each group's launch template, then
//! replaces instances either through a provider-native instance refresh
//! or by cycling them through standby while a deploy runs against them.
//!
//! # Components
//!
//! - **`executor`**: bounded parallel execution with aggregated failures
//! - **`orchestrator`**: per-group state machine and run-level fan-out
//! - **`report`**: terminal state of every group and instance
//! - **`error`**: error kinds, including the composite of a batch

pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod report;

pub use error::{CompositeError, Failure, RolloutError, RolloutResult};
pub use executor::{BoundedExecutor, Outcome};
pub use orchestrator::{Orchestrator, RunSettings};
pub use report::{
    DeployPath, ErrorSummary, GroupPhase, GroupReport, GroupState, InstanceReport, RunReport,
    format_report,
};
