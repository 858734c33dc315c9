//! KFP operator - reconciles ML pipeline resources through Argo Workflows

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::Client;

use kfp_common::config::ControllerConfig;
use kfp_common::telemetry::{init_telemetry, TelemetryConfig};
use kfp_operator::crds::{crds_yaml, ensure_crds_installed};
use kfp_operator::runner::build_controllers;

/// KFP operator - Kubernetes operator for ML pipeline lifecycle management
#[derive(Parser, Debug)]
#[command(name = "kfp-operator", version, about, long_about = None)]
struct Cli {
    /// Print CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Controller configuration file (YAML)
    #[arg(long, env = "KFP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controllers (default mode)
    ///
    /// Installs the CRDs, then reconciles Pipelines, Experiments, Runs,
    /// RunConfigurations, RunSchedules and Providers until signalled.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let yaml = crds_yaml().map_err(|e| anyhow::anyhow!("Failed to serialize CRDs: {}", e))?;
        print!("{yaml}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig::default())?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

async fn run_controller(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = ControllerConfig::load(config_path.as_deref())?.with_env_overrides();
    config.validate()?;
    tracing::info!(
        workflow_namespace = %config.workflow_namespace,
        default_provider = %config.default_provider,
        "loaded controller configuration"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let controllers = build_controllers(client, Arc::new(config));
    futures::future::join_all(controllers).await;

    tracing::info!("controllers stopped");
    Ok(())
}
