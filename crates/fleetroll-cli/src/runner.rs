//! Deploy runner that shells out to the configured deploy command.

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use fleetroll_fleet::DeployRunner;

/// Placeholder replaced with the instance's network address.
pub const ADDRESS_PLACEHOLDER: &str = "{address}";

/// Runs `sh -c <command>` once per instance.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    template: Option<String>,
}

impl ShellRunner {
    pub fn new(template: Option<String>) -> Self {
        Self { template }
    }

    /// The command line for one instance.
    pub fn command_for(&self, address: &str) -> Option<String> {
        self.template
            .as_deref()
            .map(|t| t.replace(ADDRESS_PLACEHOLDER, address))
    }
}

#[async_trait]
impl DeployRunner for ShellRunner {
    async fn run_deploy(&self, address: &str) -> anyhow::Result<()> {
        let Some(command) = self.command_for(address) else {
            bail!("no deploy_command configured");
        };
        debug!(%address, %command, "running deploy command");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn deploy command for {address}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "deploy command failed (exit code: {}): {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }
        Ok(())
    }
}
