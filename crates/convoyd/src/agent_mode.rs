//! Agent mode: runs on each instance.
//!
//! The daemon:
//! 1. Works out which instance and service it is
//! 2. Opens the store
//! 3. Follows its assignment with a dry-run supervisor and reports status
//! 4. Stops on Ctrl-C

use std::sync::Arc;

use anyhow::Context;
use convoy_agent::{Agent, AgentDb, LoggingSupervisor};
use convoy_core::ConvoyConfig;
use tokio::sync::watch;
use tracing::info;

/// Run the agent loop until Ctrl-C.
pub async fn run_agent(
    config: ConvoyConfig,
    instance_id: Option<String>,
    service: Option<String>,
) -> anyhow::Result<()> {
    let (instance_id, service) = identity(&config, instance_id, service)?;
    info!(%instance_id, %service, "Convoy daemon starting in agent mode");

    let store = crate::open_store(&config)?;
    let db = AgentDb::new(store, instance_id, service);
    let agent = Agent::new(
        db,
        Arc::new(LoggingSupervisor::new()),
        &config.agent,
        config.backoff.max(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(agent.run(shutdown_rx));

    crate::shutdown_on_ctrl_c(shutdown_tx).await?;
    let _ = handle.await;

    info!("agent stopped");
    Ok(())
}

/// Flags win over the config file; both must end up set.
fn identity(
    config: &ConvoyConfig,
    instance_id: Option<String>,
    service: Option<String>,
) -> anyhow::Result<(String, String)> {
    let instance_id = instance_id
        .or_else(|| config.agent.instance_id.clone())
        .context("no instance id: pass --instance-id or set agent.instance_id")?;
    let service = service
        .or_else(|| config.agent.service.clone())
        .context("no service: pass --service or set agent.service")?;
    Ok((instance_id, service))
}
