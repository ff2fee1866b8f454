//! Rolling deployment orchestrator. Drives each group from image
//! publication to replaced instances.
//!
//! Per group the phases are:
//!
//! ```text
//! Preflight ─► PublishImage ─► UpdateLaunchTemplate ─┬─► Refresh ─► Done
//!                                                    └─► Standby ─► Done
//! ```
//!
//! Any error moves the group to `Failed` in the phase it happened in.
//! Groups run through a [`BoundedExecutor`]; on the standby path the
//! instances of one group run through a second, independently sized one.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use fleetroll_core::{DeployConfig, GroupProperties, RunConfig};
use fleetroll_fleet::{
    DeployRunner, FleetApi, FleetError, Group, ImagePublisher, Instance, LaunchTemplate, Poller,
    RefreshOutcome, RefreshSnapshot,
};

use crate::error::{RolloutError, RolloutResult};
use crate::executor::{BoundedExecutor, Outcome};
use crate::report::{
    DeployPath, ErrorSummary, GroupPhase, GroupReport, GroupState, InstanceReport, RunReport,
};

/// Knobs of one deployment run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub group_concurrency: usize,
    pub instance_concurrency: usize,
    pub refresh_poller: Poller,
    pub standby_poller: Poller,
    pub keep_template_versions: Option<usize>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&RunConfig::default())
    }
}

impl RunSettings {
    pub fn from_config(run: &RunConfig) -> Self {
        Self {
            group_concurrency: run.group_concurrency,
            instance_concurrency: run.instance_concurrency,
            refresh_poller: Poller::new(run.refresh_poll_interval())
                .with_deadline(run.refresh_timeout()),
            standby_poller: Poller::new(run.standby_poll_interval())
                .with_deadline(run.standby_timeout()),
            keep_template_versions: run.keep_template_versions,
        }
    }

    /// Poll refreshes every `interval`, giving up after `deadline`.
    pub fn with_refresh_polling(mut self, interval: Duration, deadline: Option<Duration>) -> Self {
        self.refresh_poller = Poller::new(interval).with_deadline(deadline);
        self
    }

    pub fn with_concurrency(mut self, groups: usize, instances: usize) -> Self {
        self.group_concurrency = groups;
        self.instance_concurrency = instances;
        self
    }
}

/// Coordinates a run over many groups.
///
/// Cheap to clone: collaborators are shared behind `Arc`s.
#[derive(Clone)]
pub struct Orchestrator {
    api: Arc<dyn FleetApi>,
    publisher: Arc<dyn ImagePublisher>,
    runner: Arc<dyn DeployRunner>,
    settings: RunSettings,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn FleetApi>,
        publisher: Arc<dyn ImagePublisher>,
        runner: Arc<dyn DeployRunner>,
        settings: RunSettings,
    ) -> Self {
        Self {
            api,
            publisher,
            runner,
            settings,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Validate `config`, then deploy the `selected` groups (all of them
    /// when empty). An invalid configuration aborts before any remote call.
    pub async fn run_config(
        &self,
        config: &DeployConfig,
        selected: &[String],
    ) -> RolloutResult<RunReport> {
        let groups = config.select(selected)?;
        Ok(self.run(groups).await)
    }

    /// Deploy every group and report each one's terminal state.
    ///
    /// A failing group never stops the others.
    pub async fn run(&self, groups: Vec<GroupProperties>) -> RunReport {
        info!(
            groups = groups.len(),
            group_concurrency = self.settings.group_concurrency,
            instance_concurrency = self.settings.instance_concurrency,
            "starting rolling deployment"
        );

        let paths: Vec<(String, DeployPath)> = groups
            .iter()
            .map(|g| (g.name().to_string(), path_for(g)))
            .collect();
        let items = groups
            .into_iter()
            .map(|g| (g.name().to_string(), g))
            .collect();

        let this = self.clone();
        let outcomes = BoundedExecutor::new(self.settings.group_concurrency)
            .run(items, move |props| {
                let this = this.clone();
                async move { Ok::<_, RolloutError>(this.deploy_group(props).await) }
            })
            .await;

        let reports = outcomes
            .into_iter()
            .map(|Outcome { origin, result }| match result {
                Ok(report) => report,
                Err(err) => {
                    let path = paths
                        .iter()
                        .find(|(name, _)| *name == origin)
                        .map_or(DeployPath::Refresh, |(_, p)| *p);
                    let mut report = GroupReport::new(&origin, path);
                    report.finish(Err(err));
                    report
                }
            })
            .collect();

        let report = RunReport::new(reports);
        if report.is_success() {
            info!(groups = report.groups.len(), "rolling deployment complete");
        } else {
            let failed = report.groups.iter().filter(|g| !g.is_done()).count();
            warn!(failed, groups = report.groups.len(), "rolling deployment finished with failures");
        }
        report
    }

    /// Drive one group to `Done` or `Failed`.
    pub async fn deploy_group(&self, props: GroupProperties) -> GroupReport {
        let mut report = GroupReport::new(props.name(), path_for(&props));
        let group = Arc::new(
            Group::new(props, Arc::clone(&self.api)).with_standby_poller(self.settings.standby_poller),
        );

        let result = self.drive(&group, &mut report).await;
        match &result {
            Ok(()) => info!(group = %group.name(), "group done"),
            Err(err) => warn!(
                group = %group.name(),
                phase = ?report.phase,
                kind = err.kind(),
                error = %err,
                "group failed"
            ),
        }
        report.finish(result);
        report
    }

    async fn drive(&self, group: &Arc<Group>, report: &mut GroupReport) -> RolloutResult<()> {
        enter(report, GroupPhase::Preflight);
        if !group.exists().await? {
            return Err(RolloutError::GroupNotFound(group.name().to_string()));
        }
        let template = group.launch_template().await?.clone();

        enter(report, GroupPhase::PublishImage);
        let image_id = match group.properties().image_id() {
            Some(image) => {
                info!(group = %group.name(), image, "reusing supplied image");
                image.to_string()
            }
            None => {
                let image = self.publisher.create_image(group.name(), &template).await?;
                info!(group = %group.name(), image = %image, "published image");
                image
            }
        };
        report.image_id = Some(image_id.clone());

        enter(report, GroupPhase::UpdateLaunchTemplate);
        let updated = self
            .publisher
            .create_template_version(&template, &image_id)
            .await?;
        info!(
            group = %group.name(),
            template = %updated.id,
            version = %updated.version,
            "launch template updated"
        );
        report.template_version = Some(updated.version.clone());
        self.prune_template_versions(group, &updated).await;

        if group.rolling() {
            enter(report, GroupPhase::Refresh);
            self.refresh(group, &template, &updated.version, report).await
        } else {
            enter(report, GroupPhase::Standby);
            self.standby(group, report).await
        }
    }

    /// Housekeeping only: a failed prune is logged and the run goes on.
    async fn prune_template_versions(&self, group: &Group, template: &LaunchTemplate) {
        let Some(keep) = self.settings.keep_template_versions else {
            return;
        };
        match self.publisher.prune_template_versions(template, keep).await {
            Ok(deleted) if !deleted.is_empty() => {
                info!(group = %group.name(), ?deleted, keep, "pruned launch template versions");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(group = %group.name(), error = %err, "failed to prune launch template versions");
            }
        }
    }

    async fn refresh(
        &self,
        group: &Group,
        template: &LaunchTemplate,
        version: &str,
        report: &mut GroupReport,
    ) -> RolloutResult<()> {
        let refresh_id = group.start_instance_refresh(template, version).await?;
        report.refresh_id = Some(refresh_id.clone());

        let operation = format!("instance refresh {refresh_id} of {}", group.name());
        let polled = self
            .settings
            .refresh_poller
            .until(
                &operation,
                move || async move {
                    let snapshot = group.latest_instance_refresh().await?;
                    if let Some(s) = &snapshot {
                        debug!(
                            group = %group.name(),
                            refresh = %s.id,
                            status = %s.status,
                            percentage = ?s.percentage,
                            "instance refresh progress"
                        );
                    }
                    Ok::<_, FleetError>(snapshot)
                },
                |snapshot: &Option<RefreshSnapshot>| {
                    snapshot.as_ref().is_some_and(|s| s.status.is_completed())
                },
            )
            .await?;

        let Some(snapshot) = polled else {
            return Err(RolloutError::Fleet(FleetError::Api(format!(
                "instance refresh {refresh_id} disappeared"
            ))));
        };
        report.refresh_status = Some(snapshot.status);
        report.refresh_percentage = snapshot.percentage;

        match snapshot.outcome() {
            RefreshOutcome::CompletedSuccess => {
                info!(group = %group.name(), refresh = %refresh_id, "instance refresh successful");
                Ok(())
            }
            RefreshOutcome::CompletedFailure => Err(RolloutError::RefreshFailed {
                group: group.name().to_string(),
                refresh_id,
                percentage: snapshot.percentage,
            }),
            RefreshOutcome::CompletedOther | RefreshOutcome::InProgress => {
                Err(RolloutError::RefreshIncomplete {
                    group: group.name().to_string(),
                    refresh_id,
                    status: snapshot.status,
                })
            }
        }
    }

    async fn standby(&self, group: &Arc<Group>, report: &mut GroupReport) -> RolloutResult<()> {
        let instances = group.instances().await?;
        if instances.is_empty() {
            info!(group = %group.name(), "no in-service instances to deploy");
            return Ok(());
        }
        info!(group = %group.name(), instances = instances.len(), "cycling instances through standby");

        let addresses: Vec<(String, Option<String>)> = instances
            .iter()
            .map(|i| (i.id.clone(), i.address().map(str::to_string)))
            .collect();
        let items = instances.into_iter().map(|i| (i.id.clone(), i)).collect();

        let group = Arc::clone(group);
        let runner = Arc::clone(&self.runner);
        let outcomes = BoundedExecutor::new(self.settings.instance_concurrency)
            .run(items, move |instance| {
                let group = Arc::clone(&group);
                let runner = Arc::clone(&runner);
                async move { cycle_instance(&group, runner.as_ref(), &instance).await }
            })
            .await;

        for outcome in &outcomes {
            let address = addresses
                .iter()
                .find(|(id, _)| *id == outcome.origin)
                .and_then(|(_, a)| a.clone());
            report.instances.push(InstanceReport {
                id: outcome.origin.clone(),
                address,
                state: if outcome.result.is_ok() {
                    GroupState::Done
                } else {
                    GroupState::Failed
                },
                error: outcome.result.as_ref().err().map(ErrorSummary::from),
            });
        }
        report.instances.sort_by(|a, b| a.id.cmp(&b.id));

        crate::executor::collect(outcomes).map(|_| ())
    }
}

/// Standby, deploy, exit standby for one instance.
///
/// Exit standby is attempted even when the deploy fails so the instance
/// goes back into service; the deploy failure is what gets reported.
async fn cycle_instance(group: &Group, runner: &dyn DeployRunner, instance: &Instance) -> RolloutResult<()> {
    group.enter_standby(instance).await?;

    let deployed = match instance.address() {
        Some(address) => {
            debug!(group = %group.name(), instance = %instance.id, %address, "running deploy");
            runner
                .run_deploy(address)
                .await
                .map_err(|e| RolloutError::RemoteDeploy {
                    instance: instance.id.clone(),
                    message: format!("{e:#}"),
                })
        }
        None => Err(RolloutError::RemoteDeploy {
            instance: instance.id.clone(),
            message: "instance has no network address".to_string(),
        }),
    };

    let exited = group.exit_standby(instance).await;

    match (deployed, exited) {
        (Ok(()), Ok(())) => {
            info!(group = %group.name(), instance = %instance.id, "instance deployed");
            Ok(())
        }
        (Ok(()), Err(err)) => Err(err.into()),
        (Err(err), exited) => {
            if let Err(exit_err) = exited {
                warn!(
                    group = %group.name(),
                    instance = %instance.id,
                    error = %exit_err,
                    "exit standby failed after deploy failure"
                );
            }
            Err(err)
        }
    }
}

fn path_for(props: &GroupProperties) -> DeployPath {
    if props.rolling() {
        DeployPath::Refresh
    } else {
        DeployPath::Standby
    }
}

fn enter(report: &mut GroupReport, phase: GroupPhase) {
    debug!(group = %report.name, ?phase, "entering phase");
    report.phase = phase;
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetroll_fleet::{FleetFixture, SimulatedFleet};

    struct OkRunner;

    #[async_trait::async_trait]
    impl DeployRunner for OkRunner {
        async fn run_deploy(&self, _address: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn orchestrator(fixture: &str, settings: RunSettings) -> (Arc<SimulatedFleet>, Orchestrator) {
        let fixture: FleetFixture = toml::from_str(fixture).unwrap();
        let fleet = Arc::new(SimulatedFleet::from_fixture(fixture));
        let orch = Orchestrator::new(fleet.clone(), fleet.clone(), Arc::new(OkRunner), settings);
        (fleet, orch)
    }

    fn fast() -> RunSettings {
        RunSettings::default().with_refresh_polling(Duration::from_secs(1), None)
    }

    const WEB: &str = r#"
[groups.web]
launch_template = { id = "lt-web", name = "web", version = "1" }
"#;

    #[tokio::test(start_paused = true)]
    async fn missing_group_fails_in_preflight() {
        let (fleet, orch) = orchestrator(WEB, fast());
        let report = orch.deploy_group(GroupProperties::new("ghost")).await;
        assert_eq!(report.state, GroupState::Failed);
        assert_eq!(report.phase, GroupPhase::Preflight);
        assert_eq!(report.error.as_ref().unwrap().kind(), "GroupNotFound");
        assert_eq!(fleet.call_count("create_image"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_launch_template_is_fatal() {
        let (fleet, orch) = orchestrator("[groups.bare]\n", fast());
        let report = orch.deploy_group(GroupProperties::new("bare")).await;
        assert_eq!(report.error.as_ref().unwrap().kind(), "NoLaunchTemplate");
        assert_eq!(fleet.call_count("create_image"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn supplied_image_skips_publication() {
        let (fleet, orch) = orchestrator(WEB, fast());
        let props = GroupProperties::new("web").with_image_id("ami-given");
        let report = orch.deploy_group(props).await;

        assert!(report.is_done(), "{:?}", report.error);
        assert_eq!(report.image_id.as_deref(), Some("ami-given"));
        assert_eq!(report.template_version.as_deref(), Some("2"));
        assert_eq!(fleet.call_count("create_image"), 0);
        assert_eq!(fleet.call_count("create_template_version lt-web ami-given"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn image_failure_stops_before_template_update() {
        let fixture = format!("{WEB}fail_create_image = true\n");
        let (fleet, orch) = orchestrator(&fixture, fast());
        let report = orch.deploy_group(GroupProperties::new("web")).await;

        assert_eq!(report.phase, GroupPhase::PublishImage);
        assert_eq!(report.error.as_ref().unwrap().kind(), "FleetError");
        assert_eq!(fleet.call_count("create_template_version"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failure_is_reported() {
        let fixture = format!("{WEB}refresh_statuses = [\"InProgress\", \"Failed\"]\n");
        let (_fleet, orch) = orchestrator(&fixture, fast());
        let report = orch.deploy_group(GroupProperties::new("web")).await;

        assert_eq!(report.phase, GroupPhase::Refresh);
        assert_eq!(report.error.as_ref().unwrap().kind(), "RefreshFailed");
        assert_eq!(report.refresh_status, Some(fleetroll_fleet::RefreshStatus::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_is_reported_as_incomplete() {
        let fixture = format!(
            "{WEB}refresh_statuses = [\"InProgress\", \"RollbackInProgress\", \"RollbackSuccessful\"]\n"
        );
        let (_fleet, orch) = orchestrator(&fixture, fast());
        let report = orch.deploy_group(GroupProperties::new("web")).await;

        assert_eq!(report.state, GroupState::Failed);
        assert_eq!(report.error.as_ref().unwrap().kind(), "RefreshIncomplete");
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_timeout_fails_the_group() {
        let fixture = format!("{WEB}refresh_statuses = [\"InProgress\"]\n");
        let settings = RunSettings::default()
            .with_refresh_polling(Duration::from_secs(10), Some(Duration::from_secs(60)));
        let (_fleet, orch) = orchestrator(&fixture, settings);
        let report = orch.deploy_group(GroupProperties::new("web")).await;

        assert_eq!(report.error.as_ref().unwrap().kind(), "Timeout");
        assert!(report.refresh_id.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn prunes_old_template_versions() {
        let mut settings = fast();
        settings.keep_template_versions = Some(1);
        let (fleet, orch) = orchestrator(WEB, settings);
        let report = orch.deploy_group(GroupProperties::new("web")).await;

        assert!(report.is_done());
        assert_eq!(fleet.template_versions("web"), ["2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_standby_group_is_done() {
        let fixture = r#"
[groups.worker]
launch_template = { id = "lt-worker", name = "worker", version = "1" }
"#;
        let (_fleet, orch) = orchestrator(fixture, fast());
        let report = orch
            .deploy_group(GroupProperties::new("worker").with_rolling(false))
            .await;

        assert!(report.is_done());
        assert_eq!(report.path, DeployPath::Standby);
        assert!(report.instances.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn instance_without_address_fails_but_returns_to_service() {
        let fixture = r#"
[groups.worker]
launch_template = { id = "lt-worker", name = "worker", version = "1" }

[[groups.worker.instances]]
id = "i-1"
"#;
        let (fleet, orch) = orchestrator(fixture, fast());
        let report = orch
            .deploy_group(GroupProperties::new("worker").with_rolling(false))
            .await;

        assert_eq!(report.state, GroupState::Failed);
        assert_eq!(report.instances[0].error.as_ref().unwrap().kind, "RemoteDeployFailure");
        assert_eq!(fleet.call_count("exit_standby worker i-1"), 1);
    }
}
