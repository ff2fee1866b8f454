//! fleetroll.toml configuration parser.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::properties::GroupProperties;

/// A whole deployment run: run-level settings plus the target groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub groups: BTreeMap<String, GroupConfig>,
}

/// Run-level settings shared by every group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Groups processed at the same time.
    pub group_concurrency: usize,
    /// Instances cycled through standby at the same time, per group.
    pub instance_concurrency: usize,
    pub refresh_poll_interval_secs: u64,
    pub refresh_timeout_secs: Option<u64>,
    pub standby_poll_interval_secs: u64,
    pub standby_timeout_secs: Option<u64>,
    /// Shell command run once per instance on the standby path.
    /// `{address}` is replaced with the instance's network address.
    pub deploy_command: Option<String>,
    /// Launch template versions to keep after publishing a new one.
    pub keep_template_versions: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            group_concurrency: 1,
            instance_concurrency: 1,
            refresh_poll_interval_secs: 15,
            refresh_timeout_secs: None,
            standby_poll_interval_secs: 1,
            standby_timeout_secs: None,
            deploy_command: None,
            keep_template_versions: None,
        }
    }
}

impl RunConfig {
    pub fn refresh_poll_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_poll_interval_secs)
    }

    pub fn refresh_timeout(&self) -> Option<Duration> {
        self.refresh_timeout_secs.map(Duration::from_secs)
    }

    pub fn standby_poll_interval(&self) -> Duration {
        Duration::from_secs(self.standby_poll_interval_secs)
    }

    pub fn standby_timeout(&self) -> Option<Duration> {
        self.standby_timeout_secs.map(Duration::from_secs)
    }
}

/// Raw, unvalidated properties of one group as written in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupConfig {
    pub min_healthy_percentage: Option<u32>,
    pub max_healthy_percentage: Option<u32>,
    /// Deprecated alias of `min_healthy_percentage`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthy_percentage: Option<u32>,
    pub rolling: Option<bool>,
    pub instance_warmup: Option<u32>,
    pub image_id: Option<String>,
    /// Provider-specific keys, passed through as-is.
    #[serde(flatten)]
    pub overrides: BTreeMap<String, toml::Value>,
}

impl DeployConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse a config document and migrate deprecated keys.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let mut config: DeployConfig = toml::from_str(content)?;
        config.migrate_deprecated();
        Ok(config)
    }

    /// Rewrite `healthy_percentage` to `min_healthy_percentage`.
    ///
    /// When both keys are present the alias is left in place so that
    /// validation reports the conflict.
    pub fn migrate_deprecated(&mut self) {
        for (name, group) in &mut self.groups {
            let Some(value) = group.healthy_percentage else {
                continue;
            };
            if group.min_healthy_percentage.is_some() {
                continue;
            }
            warn!(
                group = %name,
                value,
                "healthy_percentage is deprecated, use min_healthy_percentage"
            );
            group.min_healthy_percentage = Some(value);
            group.healthy_percentage = None;
        }
    }

    /// Validate the whole file and build the properties of every group.
    pub fn validate(&self) -> ConfigResult<Vec<GroupProperties>> {
        if self.run.group_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency {
                field: "group_concurrency",
            });
        }
        if self.run.instance_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency {
                field: "instance_concurrency",
            });
        }
        if self.run.refresh_poll_interval_secs == 0 {
            return Err(ConfigError::ZeroPollInterval {
                field: "refresh_poll_interval_secs",
            });
        }
        if self.run.standby_poll_interval_secs == 0 {
            return Err(ConfigError::ZeroPollInterval {
                field: "standby_poll_interval_secs",
            });
        }
        if self.groups.is_empty() {
            return Err(ConfigError::NoGroups);
        }

        let groups = self
            .groups
            .iter()
            .map(|(name, group)| GroupProperties::from_config(name, group))
            .collect::<ConfigResult<Vec<_>>>()?;

        if self.run.deploy_command.is_none() {
            let manual: Vec<String> = groups
                .iter()
                .filter(|g| !g.rolling())
                .map(|g| g.name().to_string())
                .collect();
            if !manual.is_empty() {
                return Err(ConfigError::MissingDeployCommand { groups: manual });
            }
        }

        Ok(groups)
    }

    /// Validate and keep only the named groups. An empty selection keeps all.
    pub fn select(&self, names: &[String]) -> ConfigResult<Vec<GroupProperties>> {
        if let Some(unknown) = names.iter().find(|n| !self.groups.contains_key(n.as_str())) {
            return Err(ConfigError::UnknownGroup(unknown.clone()));
        }

        let groups = self.validate()?;
        if names.is_empty() {
            return Ok(groups);
        }
        Ok(groups
            .into_iter()
            .filter(|g| names.iter().any(|n| n == g.name()))
            .collect())
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
