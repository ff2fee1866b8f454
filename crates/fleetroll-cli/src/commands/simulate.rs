use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use fleetroll_core::DeployConfig;
use fleetroll_fleet::{FleetFixture, SimulatedFleet};
use fleetroll_rollout::{Orchestrator, RunReport, RunSettings, format_report};

use crate::runner::ShellRunner;

pub async fn simulate(
    config_path: &str,
    fleet_path: &str,
    groups: &[String],
    format: &str,
) -> anyhow::Result<()> {
    let report = run(config_path, fleet_path, groups).await?;

    match format {
        "json" => println!("{}", report.to_json()?),
        _ => println!("{}", format_report(&report)),
    }

    // Non-zero exit status when any group failed.
    report.into_result()?;
    Ok(())
}

pub async fn run(config_path: &str, fleet_path: &str, groups: &[String]) -> anyhow::Result<RunReport> {
    let config = DeployConfig::from_file(Path::new(config_path))?;
    let fixture = FleetFixture::from_file(Path::new(fleet_path))
        .with_context(|| format!("failed to load fleet fixture {fleet_path}"))?;

    let fleet = Arc::new(SimulatedFleet::from_fixture(fixture));
    let runner = Arc::new(ShellRunner::new(config.run.deploy_command.clone()));
    let orchestrator = Orchestrator::new(
        fleet.clone(),
        fleet,
        runner,
        RunSettings::from_config(&config.run),
    );

    Ok(orchestrator.run_config(&config, groups).await?)
}
