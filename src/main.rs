//! SKE - Kubernetes engine for host-based clusters

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context;
use clap::{Parser, Subcommand};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ske::addons::enabled_addons;
use ske::cluster::{Cluster, ClusterConfig};
use ske::hosts::DryRunAgent;
use ske::services::PlaneOrchestrator;

/// Build version, overridden by the release pipeline
const VERSION: &str = match option_env!("SKE_VERSION") {
    Some(version) => version,
    None => concat!("v", env!("CARGO_PKG_VERSION"), "-ske-1"),
};

/// Release tags look like `v1.2.3-ske` or `v1.2.3-ske-4`
static RELEASE_VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v\d+\.\d+\.\d+-ske(-\d+)?$").expect("valid release regex (verified by tests)")
});

/// SKE - validate and converge Kubernetes clusters from a host list
#[derive(Parser, Debug)]
#[command(name = "ske", version = VERSION, about, long_about = None)]
struct Cli {
    /// Cluster description file
    #[arg(short, long, env = "SKE_CONFIG", default_value = "cluster.yml", global = true)]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the cluster description and print its topology
    Validate,

    /// Show the host operations a deploy or removal would perform
    #[command(subcommand)]
    Plan(PlanCommand),

    /// Render the manifests of every enabled addon
    Addons,

    /// Print the version
    Version,
}

#[derive(Subcommand, Debug)]
enum PlanCommand {
    /// Bring up etcd, control and worker planes
    Up(PlanArgs),
    /// Tear down worker, control and etcd planes
    Remove(PlanArgs),
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Hosts converged at once within a stage
    #[arg(long, default_value = "1")]
    concurrency: usize,

    /// Print the recorded operations as YAML
    #[arg(long)]
    yaml: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    if !is_release_version(VERSION) {
        warn!(version = VERSION, "This is not an officially supported version of ske");
    }

    match cli.command {
        Commands::Validate => run_validate(&cli.config).await,
        Commands::Plan(PlanCommand::Up(args)) => run_plan(&cli.config, args, true).await,
        Commands::Plan(PlanCommand::Remove(args)) => run_plan(&cli.config, args, false).await,
        Commands::Addons => run_addons(&cli.config).await,
        Commands::Version => {
            println!("ske version {VERSION}");
            Ok(())
        }
    }
}

async fn load_cluster(path: &Path) -> anyhow::Result<Cluster> {
    let config = ClusterConfig::load(path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;
    Cluster::new(config).context("invalid cluster description")
}

async fn run_validate(path: &Path) -> anyhow::Result<()> {
    let cluster = load_cluster(path).await?;
    let topology = cluster.topology();
    for (label, hosts) in [
        ("etcd", topology.etcd_hosts()),
        ("controlplane", topology.control_hosts()),
        ("worker", topology.worker_hosts()),
    ] {
        let names: Vec<&str> = hosts.iter().map(|h| h.node_name()).collect();
        println!("{label}: {}", names.join(", "));
    }
    info!("Cluster description is valid");
    Ok(())
}

async fn run_plan(path: &Path, args: PlanArgs, up: bool) -> anyhow::Result<()> {
    let cluster = load_cluster(path).await?;
    let agent = DryRunAgent::new();
    let orchestrator = PlaneOrchestrator::new(agent.clone()).with_concurrency(args.concurrency);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    if up {
        cluster.deploy(&orchestrator, &cancel).await?;
    } else {
        cluster.remove(&orchestrator, &cancel).await?;
    }

    if args.yaml {
        print!("{}", agent.to_yaml()?);
    } else {
        print!("{}", agent.render_plan());
    }
    Ok(())
}

async fn run_addons(path: &Path) -> anyhow::Result<()> {
    let cluster = load_cluster(path).await?;
    let addons = enabled_addons(cluster.config())?;
    if addons.is_empty() {
        info!("No addons enabled");
    }
    for (name, manifest) in addons {
        println!("# addon: {name}\n---\n{manifest}");
    }
    Ok(())
}

fn is_release_version(version: &str) -> bool {
    RELEASE_VERSION_REGEX.is_match(version)
}
