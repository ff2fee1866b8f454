//! Validated per-group properties.
//!
//! A [`GroupProperties`] can only be obtained through validation, so code
//! downstream of config loading never re-checks percentage bounds.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::GroupConfig;
use crate::error::{ConfigError, ConfigResult};

/// Declared properties of one auto scaling group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupProperties {
    name: String,
    min_healthy_percentage: Option<u32>,
    max_healthy_percentage: Option<u32>,
    rolling: bool,
    instance_warmup: Option<u32>,
    image_id: Option<String>,
    overrides: BTreeMap<String, toml::Value>,
}

impl GroupProperties {
    /// Properties for a rolling group with no healthy-percentage bounds.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            min_healthy_percentage: None,
            max_healthy_percentage: None,
            rolling: true,
            instance_warmup: None,
            image_id: None,
            overrides: BTreeMap::new(),
        }
    }

    /// Validate a group's config block.
    ///
    /// Expects deprecated keys to have been migrated already
    /// (see [`crate::DeployConfig::migrate_deprecated`]).
    pub fn from_config(name: &str, config: &GroupConfig) -> ConfigResult<Self> {
        if config.healthy_percentage.is_some() {
            // Only reachable when both the alias and the new key were set.
            return Err(ConfigError::ConflictingAlias {
                group: name.to_string(),
            });
        }

        let props = Self::new(name)
            .with_healthy_percentages(config.min_healthy_percentage, config.max_healthy_percentage)?
            .with_rolling(config.rolling.unwrap_or(true));

        Ok(Self {
            instance_warmup: config.instance_warmup,
            image_id: config.image_id.clone(),
            overrides: config.overrides.clone(),
            ..props
        })
    }

    /// Set the healthy-percentage bounds, enforcing the provider's rules.
    pub fn with_healthy_percentages(
        mut self,
        min: Option<u32>,
        max: Option<u32>,
    ) -> ConfigResult<Self> {
        validate_healthy_percentages(&self.name, min, max)?;
        self.min_healthy_percentage = min;
        self.max_healthy_percentage = max;
        Ok(self)
    }

    pub fn with_rolling(mut self, rolling: bool) -> Self {
        self.rolling = rolling;
        self
    }

    pub fn with_instance_warmup(mut self, secs: u32) -> Self {
        self.instance_warmup = Some(secs);
        self
    }

    pub fn with_image_id(mut self, image_id: &str) -> Self {
        self.image_id = Some(image_id.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_healthy_percentage(&self) -> Option<u32> {
        self.min_healthy_percentage
    }

    pub fn max_healthy_percentage(&self) -> Option<u32> {
        self.max_healthy_percentage
    }

    /// Whether instances are replaced by a provider-native instance refresh.
    /// Defaults to true.
    pub fn rolling(&self) -> bool {
        self.rolling
    }

    /// Warmup override in seconds.
    pub fn instance_warmup(&self) -> Option<u32> {
        self.instance_warmup
    }

    /// Caller-supplied image to reuse instead of publishing a new one.
    pub fn image_id(&self) -> Option<&str> {
        self.image_id.as_deref()
    }

    /// Provider-specific keys carried through untouched.
    pub fn overrides(&self) -> &BTreeMap<String, toml::Value> {
        &self.overrides
    }
}

fn validate_healthy_percentages(group: &str, min: Option<u32>, max: Option<u32>) -> ConfigResult<()> {
    if let Some(min) = min {
        if min > 100 {
            return Err(ConfigError::MinHealthyOutOfRange {
                group: group.to_string(),
                value: min,
            });
        }
    }

    let Some(max) = max else {
        return Ok(());
    };

    if !(100..=200).contains(&max) {
        return Err(ConfigError::MaxHealthyOutOfRange {
            group: group.to_string(),
            value: max,
        });
    }

    let Some(min) = min else {
        return Err(ConfigError::MaxWithoutMin {
            group: group.to_string(),
        });
    };

    if max - min > 100 {
        return Err(ConfigError::HealthySpreadTooWide {
            group: group.to_string(),
            min,
            max,
        });
    }

    Ok(())
}
