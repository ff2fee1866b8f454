//! fleetroll: rolling deployments across auto scaling groups.
//!
//! # Usage
//!
//! ```text
//! fleetroll validate --config fleetroll.toml
//! fleetroll plan --config fleetroll.toml
//! fleetroll simulate --config fleetroll.toml --fleet fleet.toml --group web
//! ```

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod runner;

#[derive(Parser)]
#[command(
    name = "fleetroll",
    about = "fleetroll — rolling deployments for auto scaling groups",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a deployment config
    Validate {
        /// Path to the deployment config
        #[arg(short, long, default_value = "fleetroll.toml")]
        config: String,
    },
    /// Show how each group would be deployed, without touching the fleet
    Plan {
        #[arg(short, long, default_value = "fleetroll.toml")]
        config: String,
    },
    /// Run a deployment against an in-memory fleet.
    ///
    /// The fleet is described by a TOML fixture: groups, launch templates,
    /// instances and the status sequence each instance refresh goes
    /// through. Standby deploys run the configured deploy_command for real.
    Simulate {
        #[arg(short, long, default_value = "fleetroll.toml")]
        config: String,
        /// Path to the fleet fixture
        #[arg(long)]
        fleet: String,
        /// Only deploy these groups (repeatable; default: all)
        #[arg(short, long = "group")]
        groups: Vec<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_format);

    match cli.command {
        Commands::Validate { config } => commands::validate::validate(&config),
        Commands::Plan { config } => commands::plan::plan(&config),
        Commands::Simulate {
            config,
            fleet,
            groups,
            format,
        } => commands::simulate::simulate(&config, &fleet, &groups, &format).await,
    }
}

/// Logs go to stderr so reports on stdout stay machine-readable.
fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fleetroll=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
}
