//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors detected while loading or validating a deployment config.
///
/// All of these abort the run before any remote call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("group {group}: min_healthy_percentage must be within 0..=100, got {value}")]
    MinHealthyOutOfRange { group: String, value: u32 },

    #[error("group {group}: max_healthy_percentage must be within 100..=200, got {value}")]
    MaxHealthyOutOfRange { group: String, value: u32 },

    #[error("group {group}: max_healthy_percentage requires min_healthy_percentage")]
    MaxWithoutMin { group: String },

    #[error(
        "group {group}: max_healthy_percentage ({max}) may exceed min_healthy_percentage ({min}) by at most 100"
    )]
    HealthySpreadTooWide { group: String, min: u32, max: u32 },

    #[error("group {group}: both healthy_percentage and min_healthy_percentage are set")]
    ConflictingAlias { group: String },

    #[error("{field} must be at least 1")]
    ZeroConcurrency { field: &'static str },

    #[error("{field} must be at least 1 second")]
    ZeroPollInterval { field: &'static str },

    #[error("groups {groups:?} are not rolling but no deploy_command is configured")]
    MissingDeployCommand { groups: Vec<String> },

    #[error("no groups configured")]
    NoGroups,

    #[error("unknown group: {0}")]
    UnknownGroup(String),
}
