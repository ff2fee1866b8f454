//! Collaborator contracts: the provider's fleet API, the image/template
//! publisher, and the per-instance deploy runner.
//!
//! Implementations must tolerate concurrent independent calls; handles
//! share one client across every task of a run.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FleetResult;
use crate::refresh::RefreshSnapshot;

/// A launch template at a specific version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchTemplate {
    pub id: String,
    pub name: String,
    pub version: String,
}

/// Lifecycle state of a group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Pending,
    InService,
    EnteringStandby,
    Standby,
    Terminating,
    Terminated,
    Detaching,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Pending => "Pending",
            LifecycleState::InService => "InService",
            LifecycleState::EnteringStandby => "EnteringStandby",
            LifecycleState::Standby => "Standby",
            LifecycleState::Terminating => "Terminating",
            LifecycleState::Terminated => "Terminated",
            LifecycleState::Detaching => "Detaching",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub instance_id: String,
    pub lifecycle_state: LifecycleState,
}

/// The provider's view of one scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub name: String,
    pub launch_template: Option<LaunchTemplate>,
    pub subnet_ids: Vec<String>,
    /// Seconds.
    pub health_check_grace_period: u32,
    pub members: Vec<GroupMember>,
}

impl GroupDescriptor {
    pub fn member(&self, instance_id: &str) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.instance_id == instance_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDetails {
    pub id: String,
    pub private_address: Option<String>,
    pub public_address: Option<String>,
    pub image_id: String,
}

/// Preferences sent with a start-instance-refresh request.
///
/// Absent values are omitted from the request rather than sent as null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_warmup: Option<u32>,
    pub skip_matching: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_healthy_percentage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_healthy_percentage: Option<u32>,
}

/// The provider's auto scaling API.
#[async_trait]
pub trait FleetApi: Send + Sync {
    async fn group_exists(&self, group: &str) -> FleetResult<bool>;

    /// Fails with [`crate::FleetError::GroupNotFound`] for unknown groups.
    async fn describe_group(&self, group: &str) -> FleetResult<GroupDescriptor>;

    /// Replace the group's instances with `template`.
    ///
    /// Fails with [`crate::FleetError::RefreshInProgress`] if the group
    /// already has an active refresh.
    async fn start_refresh(
        &self,
        group: &str,
        template: &LaunchTemplate,
        preferences: &RefreshPreferences,
    ) -> FleetResult<String>;

    /// Refreshes of `group`, most recent first. When `refresh_id` is given
    /// only that refresh is returned.
    async fn describe_refreshes(
        &self,
        group: &str,
        refresh_id: Option<&str>,
    ) -> FleetResult<Vec<RefreshSnapshot>>;

    async fn describe_instances(&self, ids: &[String]) -> FleetResult<Vec<InstanceDetails>>;

    async fn enter_standby(
        &self,
        group: &str,
        instance_id: &str,
        decrement_desired_capacity: bool,
    ) -> FleetResult<()>;

    async fn exit_standby(&self, group: &str, instance_id: &str) -> FleetResult<()>;
}

/// Publishes machine images and launch template versions.
#[async_trait]
pub trait ImagePublisher: Send + Sync {
    /// Snapshot a new machine image for `group`, built from the source the
    /// current template points at. Returns the image id.
    async fn create_image(&self, group: &str, template: &LaunchTemplate) -> FleetResult<String>;

    /// Create a new version of `template` referencing `image_id`.
    async fn create_template_version(
        &self,
        template: &LaunchTemplate,
        image_id: &str,
    ) -> FleetResult<LaunchTemplate>;

    /// Delete all but the `keep` newest versions of `template`.
    /// Returns the deleted versions.
    async fn prune_template_versions(
        &self,
        template: &LaunchTemplate,
        keep: usize,
    ) -> FleetResult<Vec<String>>;
}

/// Runs the deployment against one instance over a remote shell.
#[async_trait]
pub trait DeployRunner: Send + Sync {
    async fn run_deploy(&self, address: &str) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_preferences_are_omitted() {
        let prefs = RefreshPreferences {
            instance_warmup: None,
            skip_matching: true,
            min_healthy_percentage: Some(90),
            max_healthy_percentage: None,
        };
        let json = serde_json::to_value(&prefs).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "skip_matching": true, "min_healthy_percentage": 90 })
        );
    }

    #[test]
    fn descriptor_member_lookup() {
        let descriptor = GroupDescriptor {
            name: "web".to_string(),
            launch_template: None,
            subnet_ids: vec![],
            health_check_grace_period: 300,
            members: vec![GroupMember {
                instance_id: "i-1".to_string(),
                lifecycle_state: LifecycleState::InService,
            }],
        };
        assert!(descriptor.member("i-1").is_some());
        assert!(descriptor.member("i-2").is_none());
    }
}
