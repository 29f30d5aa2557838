//! Lattice Topology - desired-state controller for Cluster API managed topologies

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::Api;

use lattice_common::crd::Cluster;
use lattice_common::kube_utils::create_client;
use lattice_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use lattice_topology::config::{OsEnv, CONTRACT_ENV, LOG_FORMAT_ENV, RESYNC_SECS_ENV};
use lattice_topology::controller::{error_policy, reconcile, Context};
use lattice_topology::TopologyConfig;

/// Computes the desired state of Clusters built from a ClusterClass
#[derive(Parser, Debug)]
#[command(name = "lattice-topology", version, about, long_about = None)]
struct Cli {
    /// Path to a kubeconfig; in-cluster or default config when omitted
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Cluster API contract version template references are normalized to
    #[arg(long, global = true, env = CONTRACT_ENV)]
    contract: Option<String>,

    /// Seconds between reconciles of an unchanged Cluster
    #[arg(long, global = true, env = RESYNC_SECS_ENV)]
    resync_interval_secs: Option<u64>,

    /// Log line format: json or text
    #[arg(long, global = true, env = LOG_FORMAT_ENV, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the topology controller (default mode)
    Controller,
}

impl Cli {
    /// Settings from flags, falling back to the environment and defaults
    fn topology_config(&self) -> TopologyConfig {
        let mut config = TopologyConfig::from_env(&OsEnv);
        if let Some(contract) = self.contract.as_ref().filter(|c| !c.is_empty()) {
            config = config.with_contract(contract.clone());
        }
        if let Some(secs) = self.resync_interval_secs.filter(|s| *s > 0) {
            config = config.with_resync_interval(Duration::from_secs(secs));
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(
        TelemetryConfig::for_service("lattice-topology").with_log_format(cli.log_format),
    )?;

    match cli.command.as_ref().unwrap_or(&Commands::Controller) {
        Commands::Controller => run_controller(&cli).await,
    }
}

async fn run_controller(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.topology_config();
    tracing::info!(
        contract = %config.contract,
        resync_secs = config.resync_interval.as_secs(),
        "Starting topology controller"
    );

    let client = create_client(cli.kubeconfig.as_deref()).await?;
    let clusters: Api<Cluster> = Api::all(client.clone());
    let watcher_config = WatcherConfig::default().timeout(config.watch_timeout_secs);
    let ctx = Arc::new(Context::new(client, config));

    Controller::new(clusters, watcher_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            match result {
                Ok((cluster, action)) => tracing::debug!(
                    cluster = %cluster.name,
                    ?action,
                    "Topology reconciliation completed"
                ),
                Err(e) => tracing::error!(error = ?e, "Topology reconciliation error"),
            }
            std::future::ready(())
        })
        .await;

    tracing::info!("Topology controller stopped");
    Ok(())
}
