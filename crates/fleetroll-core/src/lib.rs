//! fleetroll-core: deployment configuration and group properties.
//!
//! Parses the `fleetroll.toml` deployment file, migrates deprecated keys,
//! and validates every group's declared properties before any remote call
//! is made.

pub mod config;
pub mod error;
pub mod properties;

pub use config::{DeployConfig, GroupConfig, RunConfig};
pub use error::{ConfigError, ConfigResult};
pub use properties::GroupProperties;
