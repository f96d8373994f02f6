//! convoyd: the Convoy daemon.
//!
//! One binary for every role:
//! - `scheduler`: reconcile assignments for a segment of the services table
//! - `agent`: follow this instance's assignment and report unit status
//! - `standalone`: the scheduler plus local agents sharing one store
//! - `publish` / `weights`: operator writes
//! - `show-config`: print the effective configuration
//!
//! The redb file is locked by the first process that opens it. Any other
//! command pointed at a store held by a running daemon fails with a lock
//! error, so on one host run `standalone` and make operator writes while
//! it is stopped.
//!
//! # Usage
//!
//! ```text
//! convoyd scheduler --config /etc/convoy/convoy.toml
//! convoyd agent --config /etc/convoy/convoy.toml --instance-id i-0abc --service web
//! convoyd standalone --config /etc/convoy/convoy.toml --service web --instance-id i-1 --instance-id i-2
//! convoyd publish --config /etc/convoy/convoy.toml --units units.json
//! convoyd weights --config /etc/convoy/convoy.toml --service web 3f2a...=3 9be1...=1
//! ```

mod agent_mode;
mod operator;
mod scheduler_mode;
mod standalone_mode;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use convoy_core::ConvoyConfig;
use convoy_store::{RedbBackend, Store};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "convoyd", about = "Convoy daemon")]
struct Cli {
    /// Path to convoy.toml. Defaults apply when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the assignment reconciler.
    Scheduler,

    /// Run the per-instance agent.
    Agent {
        /// Instance id; overrides `agent.instance_id`.
        #[arg(long)]
        instance_id: Option<String>,

        /// Service this instance belongs to; overrides `agent.service`.
        #[arg(long)]
        service: Option<String>,
    },

    /// Run the scheduler and local agents in one process on one store.
    Standalone {
        /// Local instance ids, repeatable; defaults to `agent.instance_id`.
        #[arg(long = "instance-id")]
        instance_ids: Vec<String>,

        /// Service the local instances belong to; overrides `agent.service`.
        #[arg(long)]
        service: Option<String>,
    },

    /// Store a revision from a JSON array of units and print its hash.
    Publish {
        #[arg(long)]
        units: PathBuf,
    },

    /// Replace a service's revision weights.
    Weights {
        #[arg(long)]
        service: String,

        /// `<revision>=<weight>` pairs.
        #[arg(required = true)]
        weights: Vec<String>,
    },

    /// Print the effective configuration as TOML.
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Scheduler => scheduler_mode::run_scheduler(config).await,
        Command::Agent {
            instance_id,
            service,
        } => agent_mode::run_agent(config, instance_id, service).await,
        Command::Standalone {
            instance_ids,
            service,
        } => standalone_mode::run_standalone(config, instance_ids, service).await,
        Command::Publish { units } => operator::publish(&config, &units).await,
        Command::Weights { service, weights } => operator::weights(&config, &service, &weights).await,
        Command::ShowConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,convoyd=debug,convoy_scheduler=debug,convoy_agent=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ConvoyConfig> {
    match path {
        Some(path) => ConvoyConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(ConvoyConfig::default()),
    }
}

/// Open the redb file named in the config, creating its directory.
pub(crate) fn open_store(config: &ConvoyConfig) -> anyhow::Result<Store> {
    let path = &config.store.path;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create store directory {}", dir.display()))?;
    }
    let backend = RedbBackend::open(path)
        .with_context(|| format!("failed to open store at {}", path.display()))?;
    info!(path = ?path, "state store opened");
    Ok(Store::from_config(Arc::new(backend), &config.store))
}

/// Flip `tx` on Ctrl-C.
pub(crate) async fn shutdown_on_ctrl_c(tx: watch::Sender<bool>) -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = tx.send(true);
    Ok(())
}
