//! In-memory fleet.
//!
//! Implements [`FleetApi`] and [`ImagePublisher`] over a fixture so the
//! orchestrator can be exercised without a provider: instance refreshes
//! follow a scripted status sequence, standby transitions converge after a
//! configurable number of describe calls, and every call is journaled.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::api::{
    FleetApi, GroupDescriptor, GroupMember, ImagePublisher, InstanceDetails, LaunchTemplate,
    LifecycleState, RefreshPreferences,
};
use crate::error::{FleetError, FleetResult};
use crate::refresh::{RefreshSnapshot, RefreshStatus};

/// Declarative description of a simulated fleet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetFixture {
    #[serde(default)]
    pub groups: BTreeMap<String, GroupFixture>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroupFixture {
    pub launch_template: Option<LaunchTemplate>,
    pub subnet_ids: Vec<String>,
    pub health_check_grace_period: u32,
    pub instances: Vec<InstanceFixture>,
    /// Statuses returned by successive polls of a started refresh. The last
    /// one repeats once the script runs out.
    pub refresh_statuses: Vec<RefreshStatus>,
    /// Another refresh is already running, so starting one fails.
    pub refresh_in_progress: bool,
    /// Describe calls an instance spends in `EnteringStandby`.
    pub standby_delay: u32,
    pub fail_create_image: bool,
}

impl Default for GroupFixture {
    fn default() -> Self {
        Self {
            launch_template: None,
            subnet_ids: Vec::new(),
            health_check_grace_period: 300,
            instances: Vec::new(),
            refresh_statuses: vec![RefreshStatus::InProgress, RefreshStatus::Successful],
            refresh_in_progress: false,
            standby_delay: 0,
            fail_create_image: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceFixture {
    pub id: String,
    pub private_address: Option<String>,
    pub public_address: Option<String>,
    #[serde(default)]
    pub image_id: String,
    #[serde(default = "in_service")]
    pub lifecycle_state: LifecycleState,
}

fn in_service() -> LifecycleState {
    LifecycleState::InService
}

impl FleetFixture {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

struct ActiveRefresh {
    snapshot: RefreshSnapshot,
    script: VecDeque<RefreshStatus>,
    steps: usize,
}

struct SimGroup {
    descriptor: GroupDescriptor,
    desired_capacity: u32,
    /// Remaining describe calls before a member reaches `Standby`.
    entering_standby: HashMap<String, u32>,
    standby_delay: u32,
    refresh_statuses: Vec<RefreshStatus>,
    refresh_blocked: bool,
    refresh: Option<ActiveRefresh>,
    /// Versions of the group's launch template, oldest first.
    template_versions: Vec<String>,
    fail_create_image: bool,
}

impl SimGroup {
    fn tick_standby(&mut self) {
        let mut converged = Vec::new();
        for (id, remaining) in self.entering_standby.iter_mut() {
            if *remaining == 0 {
                converged.push(id.clone());
            } else {
                *remaining -= 1;
            }
        }
        for id in converged {
            self.entering_standby.remove(&id);
            self.set_state(&id, LifecycleState::Standby);
        }
    }

    fn member_state(&self, id: &str) -> Option<LifecycleState> {
        self.descriptor.member(id).map(|m| m.lifecycle_state)
    }

    fn set_state(&mut self, id: &str, state: LifecycleState) {
        if let Some(member) = self
            .descriptor
            .members
            .iter_mut()
            .find(|m| m.instance_id == id)
        {
            member.lifecycle_state = state;
        }
    }

    fn refresh_active(&self) -> bool {
        self.refresh_blocked
            || self
                .refresh
                .as_ref()
                .is_some_and(|r| !r.snapshot.status.is_completed())
    }
}

#[derive(Default)]
struct FleetState {
    groups: BTreeMap<String, SimGroup>,
    instances: BTreeMap<String, InstanceDetails>,
    journal: Vec<String>,
    next_id: u64,
}

impl FleetState {
    fn group(&mut self, name: &str) -> FleetResult<&mut SimGroup> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| FleetError::GroupNotFound(name.to_string()))
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn group_by_template(&mut self, template_id: &str) -> FleetResult<&mut SimGroup> {
        self.groups
            .values_mut()
            .find(|g| {
                g.descriptor
                    .launch_template
                    .as_ref()
                    .is_some_and(|t| t.id == template_id)
            })
            .ok_or_else(|| FleetError::Api(format!("launch template not found: {template_id}")))
    }
}

/// A fleet that lives entirely in memory.
pub struct SimulatedFleet {
    state: Mutex<FleetState>,
}

impl SimulatedFleet {
    pub fn from_fixture(fixture: FleetFixture) -> Self {
        let mut state = FleetState::default();

        for (name, group) in fixture.groups {
            let members = group
                .instances
                .iter()
                .map(|i| GroupMember {
                    instance_id: i.id.clone(),
                    lifecycle_state: i.lifecycle_state,
                })
                .collect::<Vec<_>>();

            for inst in &group.instances {
                state.instances.insert(
                    inst.id.clone(),
                    InstanceDetails {
                        id: inst.id.clone(),
                        private_address: inst.private_address.clone(),
                        public_address: inst.public_address.clone(),
                        image_id: inst.image_id.clone(),
                    },
                );
            }

            let template_versions = group
                .launch_template
                .as_ref()
                .map(|t| vec![t.version.clone()])
                .unwrap_or_default();

            state.groups.insert(
                name.clone(),
                SimGroup {
                    desired_capacity: members.len() as u32,
                    descriptor: GroupDescriptor {
                        name,
                        launch_template: group.launch_template,
                        subnet_ids: group.subnet_ids,
                        health_check_grace_period: group.health_check_grace_period,
                        members,
                    },
                    entering_standby: HashMap::new(),
                    standby_delay: group.standby_delay,
                    refresh_statuses: group.refresh_statuses,
                    refresh_blocked: group.refresh_in_progress,
                    refresh: None,
                    template_versions,
                    fail_create_image: group.fail_create_image,
                },
            );
        }

        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FleetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(state: &mut FleetState, entry: String) {
        debug!(call = %entry, "simulated fleet call");
        state.journal.push(entry);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    /// Number of journaled calls starting with `prefix`.
    pub fn call_count(&self, prefix: &str) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn desired_capacity(&self, group: &str) -> Option<u32> {
        self.lock().groups.get(group).map(|g| g.desired_capacity)
    }

    pub fn template_versions(&self, group: &str) -> Vec<String> {
        self.lock()
            .groups
            .get(group)
            .map(|g| g.template_versions.clone())
            .unwrap_or_default()
    }

    /// Drop a member, as if the provider had replaced it.
    pub fn remove_instance(&self, group: &str, instance_id: &str) {
        let mut state = self.lock();
        if let Some(g) = state.groups.get_mut(group) {
            g.descriptor.members.retain(|m| m.instance_id != instance_id);
            g.entering_standby.remove(instance_id);
        }
    }
}

#[async_trait]
impl FleetApi for SimulatedFleet {
    async fn group_exists(&self, group: &str) -> FleetResult<bool> {
        let mut state = self.lock();
        Self::record(&mut state, format!("group_exists {group}"));
        Ok(state.groups.contains_key(group))
    }

    async fn describe_group(&self, group: &str) -> FleetResult<GroupDescriptor> {
        let mut state = self.lock();
        Self::record(&mut state, format!("describe_group {group}"));
        let g = state.group(group)?;
        g.tick_standby();
        Ok(g.descriptor.clone())
    }

    async fn start_refresh(
        &self,
        group: &str,
        template: &LaunchTemplate,
        preferences: &RefreshPreferences,
    ) -> FleetResult<String> {
        let mut state = self.lock();
        Self::record(
            &mut state,
            format!(
                "start_refresh {group} {}@{} {}",
                template.id,
                template.version,
                serde_json::to_string(preferences).unwrap_or_default()
            ),
        );
        let id = format!("refresh-{}", state.next_id());
        let g = state.group(group)?;
        if g.refresh_active() {
            return Err(FleetError::RefreshInProgress(group.to_string()));
        }

        let script: VecDeque<_> = g.refresh_statuses.iter().copied().collect();
        g.refresh = Some(ActiveRefresh {
            snapshot: RefreshSnapshot {
                id: id.clone(),
                status: RefreshStatus::Pending,
                percentage: None,
            },
            steps: script.len(),
            script,
        });
        g.descriptor.launch_template = Some(template.clone());
        Ok(id)
    }

    async fn describe_refreshes(
        &self,
        group: &str,
        refresh_id: Option<&str>,
    ) -> FleetResult<Vec<RefreshSnapshot>> {
        let mut state = self.lock();
        Self::record(&mut state, format!("describe_refreshes {group}"));
        let g = state.group(group)?;
        let Some(refresh) = g.refresh.as_mut() else {
            return Ok(Vec::new());
        };
        if refresh_id.is_some_and(|id| id != refresh.snapshot.id) {
            return Ok(Vec::new());
        }

        if let Some(next) = refresh.script.pop_front() {
            let done = refresh.steps - refresh.script.len();
            refresh.snapshot.status = next;
            refresh.snapshot.percentage = match next {
                RefreshStatus::Pending => None,
                RefreshStatus::Successful => Some(100),
                _ => Some((done * 100 / refresh.steps.max(1)).min(99) as u8),
            };
        }
        Ok(vec![refresh.snapshot.clone()])
    }

    async fn describe_instances(&self, ids: &[String]) -> FleetResult<Vec<InstanceDetails>> {
        let mut state = self.lock();
        Self::record(&mut state, format!("describe_instances {}", ids.join(",")));
        Ok(ids
            .iter()
            .filter_map(|id| state.instances.get(id).cloned())
            .collect())
    }

    async fn enter_standby(
        &self,
        group: &str,
        instance_id: &str,
        decrement_desired_capacity: bool,
    ) -> FleetResult<()> {
        let mut state = self.lock();
        Self::record(&mut state, format!("enter_standby {group} {instance_id}"));
        let g = state.group(group)?;
        match g.member_state(instance_id) {
            Some(LifecycleState::InService) => {}
            Some(other) => {
                return Err(FleetError::Api(format!(
                    "instance {instance_id} is {other}, not InService"
                )));
            }
            None => return Err(FleetError::InstanceNotFound(instance_id.to_string())),
        }

        g.set_state(instance_id, LifecycleState::EnteringStandby);
        g.entering_standby
            .insert(instance_id.to_string(), g.standby_delay);
        if decrement_desired_capacity {
            g.desired_capacity = g.desired_capacity.saturating_sub(1);
        }
        Ok(())
    }

    async fn exit_standby(&self, group: &str, instance_id: &str) -> FleetResult<()> {
        let mut state = self.lock();
        Self::record(&mut state, format!("exit_standby {group} {instance_id}"));
        let g = state.group(group)?;
        match g.member_state(instance_id) {
            Some(LifecycleState::Standby) => {}
            Some(other) => {
                return Err(FleetError::Api(format!(
                    "instance {instance_id} is {other}, not Standby"
                )));
            }
            None => return Err(FleetError::InstanceNotFound(instance_id.to_string())),
        }

        g.set_state(instance_id, LifecycleState::InService);
        g.desired_capacity += 1;
        Ok(())
    }
}

#[async_trait]
impl ImagePublisher for SimulatedFleet {
    async fn create_image(&self, group: &str, template: &LaunchTemplate) -> FleetResult<String> {
        let mut state = self.lock();
        Self::record(&mut state, format!("create_image {group} {}", template.id));
        let image = format!("ami-sim-{:04}", state.next_id());
        if state.group(group)?.fail_create_image {
            return Err(FleetError::Api(format!("image snapshot failed for {group}")));
        }
        Ok(image)
    }

    async fn create_template_version(
        &self,
        template: &LaunchTemplate,
        image_id: &str,
    ) -> FleetResult<LaunchTemplate> {
        let mut state = self.lock();
        Self::record(
            &mut state,
            format!("create_template_version {} {image_id}", template.id),
        );
        let g = state.group_by_template(&template.id)?;
        let next = g
            .template_versions
            .iter()
            .filter_map(|v| v.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        g.template_versions.push(next.to_string());

        Ok(LaunchTemplate {
            version: next.to_string(),
            ..template.clone()
        })
    }

    async fn prune_template_versions(
        &self,
        template: &LaunchTemplate,
        keep: usize,
    ) -> FleetResult<Vec<String>> {
        let mut state = self.lock();
        Self::record(
            &mut state,
            format!("prune_template_versions {} keep={keep}", template.id),
        );
        let g = state.group_by_template(&template.id)?;
        let excess = g.template_versions.len().saturating_sub(keep);
        Ok(g.template_versions.drain(..excess).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> FleetFixture {
        toml::from_str(
            r#"
[groups.web]
launch_template = { id = "lt-web", name = "web", version = "7" }
refresh_statuses = ["Pending", "InProgress", "InProgress", "Failed"]

[[groups.web.instances]]
id = "i-1"
image_id = "ami-old"
"#,
        )
        .unwrap()
    }

    fn template() -> LaunchTemplate {
        LaunchTemplate {
            id: "lt-web".to_string(),
            name: "web".to_string(),
            version: "7".to_string(),
        }
    }

    fn prefs() -> RefreshPreferences {
        RefreshPreferences {
            instance_warmup: None,
            skip_matching: true,
            min_healthy_percentage: None,
            max_healthy_percentage: None,
        }
    }

    #[tokio::test]
    async fn refresh_follows_script_then_sticks() {
        let fleet = SimulatedFleet::from_fixture(fixture());
        fleet.start_refresh("web", &template(), &prefs()).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..5 {
            let snap = fleet.describe_refreshes("web", None).await.unwrap().remove(0);
            seen.push(snap.status);
        }
        assert_eq!(
            seen,
            [
                RefreshStatus::Pending,
                RefreshStatus::InProgress,
                RefreshStatus::InProgress,
                RefreshStatus::Failed,
                RefreshStatus::Failed,
            ]
        );
    }

    #[tokio::test]
    async fn second_refresh_rejected_while_active() {
        let fleet = SimulatedFleet::from_fixture(fixture());
        fleet.start_refresh("web", &template(), &prefs()).await.unwrap();
        let err = fleet
            .start_refresh("web", &template(), &prefs())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::RefreshInProgress(_)));
    }

    #[tokio::test]
    async fn template_versions_increment_and_prune() {
        let fleet = SimulatedFleet::from_fixture(fixture());
        let v8 = fleet.create_template_version(&template(), "ami-1").await.unwrap();
        let v9 = fleet.create_template_version(&template(), "ami-2").await.unwrap();
        assert_eq!(v8.version, "8");
        assert_eq!(v9.version, "9");

        let deleted = fleet.prune_template_versions(&template(), 2).await.unwrap();
        assert_eq!(deleted, ["7"]);
        assert_eq!(fleet.template_versions("web"), ["8", "9"]);
    }

    #[tokio::test]
    async fn unknown_group_is_not_found() {
        let fleet = SimulatedFleet::from_fixture(fixture());
        assert!(!fleet.group_exists("db").await.unwrap());
        let err = fleet.describe_group("db").await.unwrap_err();
        assert!(matches!(err, FleetError::GroupNotFound(_)));
    }

    #[tokio::test]
    async fn exit_standby_requires_standby() {
        let fleet = SimulatedFleet::from_fixture(fixture());
        let err = fleet.exit_standby("web", "i-1").await.unwrap_err();
        assert!(matches!(err, FleetError::Api(_)));
    }
}
