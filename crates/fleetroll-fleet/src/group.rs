//! Handle on one auto scaling group for the duration of a run.
//!
//! Remote descriptor and launch template lookups are memoized on first
//! access. Membership is never memoized: `instances()` and the standby
//! transitions always ask the provider, because members change while
//! instances are being replaced.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use fleetroll_core::GroupProperties;

use crate::api::{FleetApi, GroupDescriptor, LaunchTemplate, LifecycleState, RefreshPreferences};
use crate::error::{FleetError, FleetResult};
use crate::instance::Instance;
use crate::poll::Poller;
use crate::refresh::RefreshSnapshot;

/// Interval at which standby convergence is re-checked.
pub const STANDBY_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Group {
    props: GroupProperties,
    api: Arc<dyn FleetApi>,
    descriptor: OnceCell<GroupDescriptor>,
    launch_template: OnceCell<LaunchTemplate>,
    /// Set once, when this handle starts a refresh.
    refresh_id: OnceCell<String>,
    standby_poller: Poller,
}

impl Group {
    pub fn new(props: GroupProperties, api: Arc<dyn FleetApi>) -> Self {
        Self {
            props,
            api,
            descriptor: OnceCell::new(),
            launch_template: OnceCell::new(),
            refresh_id: OnceCell::new(),
            standby_poller: Poller::new(STANDBY_POLL_INTERVAL),
        }
    }

    /// Override how standby convergence is polled.
    pub fn with_standby_poller(mut self, poller: Poller) -> Self {
        self.standby_poller = poller;
        self
    }

    pub fn name(&self) -> &str {
        self.props.name()
    }

    pub fn properties(&self) -> &GroupProperties {
        &self.props
    }

    pub fn rolling(&self) -> bool {
        self.props.rolling()
    }

    pub fn min_healthy_percentage(&self) -> Option<u32> {
        self.props.min_healthy_percentage()
    }

    pub fn max_healthy_percentage(&self) -> Option<u32> {
        self.props.max_healthy_percentage()
    }

    pub async fn exists(&self) -> FleetResult<bool> {
        self.api.group_exists(self.name()).await
    }

    /// The provider's descriptor, fetched once.
    pub async fn descriptor(&self) -> FleetResult<&GroupDescriptor> {
        self.descriptor
            .get_or_try_init(|| self.api.describe_group(self.name()))
            .await
    }

    /// Drop memoized remote state so the next lookup re-fetches it.
    pub fn invalidate(&mut self) {
        self.descriptor = OnceCell::new();
        self.launch_template = OnceCell::new();
    }

    pub async fn launch_template(&self) -> FleetResult<&LaunchTemplate> {
        self.launch_template
            .get_or_try_init(|| async {
                self.descriptor()
                    .await?
                    .launch_template
                    .clone()
                    .ok_or_else(|| FleetError::NoLaunchTemplate(self.name().to_string()))
            })
            .await
    }

    pub async fn subnet_ids(&self) -> FleetResult<&[String]> {
        Ok(&self.descriptor().await?.subnet_ids)
    }

    /// Seconds a new instance needs before it counts as healthy: the
    /// declared override, else the group's health check grace period.
    pub async fn instance_warmup(&self) -> FleetResult<u32> {
        match self.props.instance_warmup() {
            Some(secs) => Ok(secs),
            None => Ok(self.descriptor().await?.health_check_grace_period),
        }
    }

    pub async fn refresh_preferences(&self) -> FleetResult<RefreshPreferences> {
        Ok(RefreshPreferences {
            instance_warmup: Some(self.instance_warmup().await?),
            skip_matching: true,
            min_healthy_percentage: self.min_healthy_percentage(),
            max_healthy_percentage: self.max_healthy_percentage(),
        })
    }

    /// Ask the provider to replace every instance with `new_version` of
    /// `template`. Returns the refresh id.
    ///
    /// A refresh already running for the group is a terminal error for this
    /// run; it is not waited on or retried.
    pub async fn start_instance_refresh(
        &self,
        template: &LaunchTemplate,
        new_version: &str,
    ) -> FleetResult<String> {
        if self.refresh_id.initialized() {
            return Err(FleetError::RefreshInProgress(self.name().to_string()));
        }

        let target = LaunchTemplate {
            version: new_version.to_string(),
            ..template.clone()
        };
        let preferences = self.refresh_preferences().await?;
        let id = self
            .api
            .start_refresh(self.name(), &target, &preferences)
            .await?;

        let _ = self.refresh_id.set(id.clone());
        info!(
            group = %self.name(),
            refresh = %id,
            template = %target.id,
            version = %target.version,
            "started instance refresh"
        );
        Ok(id)
    }

    /// Refresh started by this handle, if any.
    pub fn refresh_id(&self) -> Option<&str> {
        self.refresh_id.get().map(String::as_str)
    }

    /// Latest refresh for the group, or the one this handle started.
    /// `None` if the group has never had one.
    pub async fn latest_instance_refresh(&self) -> FleetResult<Option<RefreshSnapshot>> {
        let refreshes = self
            .api
            .describe_refreshes(self.name(), self.refresh_id())
            .await?;
        Ok(refreshes.into_iter().next())
    }

    /// Members currently in service.
    pub async fn instances(&self) -> FleetResult<Vec<Instance>> {
        let descriptor = self.api.describe_group(self.name()).await?;
        let ids: Vec<String> = descriptor
            .members
            .into_iter()
            .filter(|m| m.lifecycle_state == LifecycleState::InService)
            .map(|m| m.instance_id)
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let details = self.api.describe_instances(&ids).await?;
        Ok(details
            .into_iter()
            .map(|d| Instance::from_details(self.name(), d))
            .collect())
    }

    /// Current lifecycle state of a member, `None` if it left the group.
    pub async fn lifecycle_state(&self, instance_id: &str) -> FleetResult<Option<LifecycleState>> {
        let descriptor = self.api.describe_group(self.name()).await?;
        Ok(descriptor.member(instance_id).map(|m| m.lifecycle_state))
    }

    /// Move `instance` to standby, decrementing desired capacity, and wait
    /// until the provider reports it in `Standby`.
    ///
    /// No-op if the instance is no longer a member of the group. An instance
    /// already on its way to standby is only waited on.
    pub async fn enter_standby(&self, instance: &Instance) -> FleetResult<()> {
        match self.lifecycle_state(&instance.id).await? {
            None => {
                debug!(group = %self.name(), instance = %instance.id, "not a member, skipping standby");
                return Ok(());
            }
            Some(LifecycleState::Standby) => return Ok(()),
            Some(LifecycleState::EnteringStandby) => {
                debug!(group = %self.name(), instance = %instance.id, "already entering standby");
            }
            Some(_) => {
                self.api
                    .enter_standby(self.name(), &instance.id, true)
                    .await?;
                debug!(group = %self.name(), instance = %instance.id, "entering standby");
            }
        }

        let operation = format!("instance {} to enter standby", instance.id);
        let state = self
            .standby_poller
            .until(
                &operation,
                || self.lifecycle_state(&instance.id),
                |state| matches!(state, None | Some(LifecycleState::Standby)),
            )
            .await?;

        if state.is_none() {
            debug!(group = %self.name(), instance = %instance.id, "left the group while entering standby");
        } else {
            info!(group = %self.name(), instance = %instance.id, "instance in standby");
        }
        Ok(())
    }

    /// Return `instance` to service. Does not wait for it to get there; the
    /// group's own health checks take over.
    ///
    /// No-op if the instance is no longer a member of the group.
    pub async fn exit_standby(&self, instance: &Instance) -> FleetResult<()> {
        if self.lifecycle_state(&instance.id).await?.is_none() {
            debug!(group = %self.name(), instance = %instance.id, "not a member, skipping exit standby");
            return Ok(());
        }

        self.api.exit_standby(self.name(), &instance.id).await?;
        info!(group = %self.name(), instance = %instance.id, "exiting standby");
        Ok(())
    }
}
