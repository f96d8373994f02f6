//! Scheduler mode: reconciles assignments for one segment of services.

use convoy_core::ConvoyConfig;
use convoy_scheduler::Scheduler;
use tokio::sync::watch;
use tracing::info;

/// Run the scheduler loop until Ctrl-C.
pub async fn run_scheduler(config: ConvoyConfig) -> anyhow::Result<()> {
    info!("Convoy daemon starting in scheduler mode");

    let store = crate::open_store(&config)?;
    let scheduler = Scheduler::from_config(store, &config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    crate::shutdown_on_ctrl_c(shutdown_tx).await?;
    let _ = handle.await;

    info!("scheduler stopped");
    Ok(())
}
