//! Standalone mode: scheduler and local agents in one process.
//!
//! The redb file can only be open in one process, so a single-host
//! deployment runs every role here on one shared [`Store`]. The roles
//! still talk only through the store tables.

use std::sync::Arc;

use anyhow::{Context, bail};
use convoy_agent::{Agent, AgentDb, LoggingSupervisor};
use convoy_core::ConvoyConfig;
use convoy_scheduler::Scheduler;
use convoy_store::Store;
use tokio::sync::watch;
use tracing::info;

/// Run the scheduler and one agent per local instance until Ctrl-C.
pub async fn run_standalone(
    config: ConvoyConfig,
    instance_ids: Vec<String>,
    service: Option<String>,
) -> anyhow::Result<()> {
    info!("Convoy daemon starting in standalone mode");

    let store = crate::open_store(&config)?;
    let scheduler = Scheduler::from_config(store.clone(), &config)?;
    let agents = local_agents(&store, &config, instance_ids, service)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let fleet = tokio::spawn(run_fleet(scheduler, agents, shutdown_rx));

    crate::shutdown_on_ctrl_c(shutdown_tx).await?;
    fleet.await.context("standalone fleet panicked")??;

    info!("standalone daemon stopped");
    Ok(())
}

/// Spawn every role and wait for them to stop on `shutdown`.
async fn run_fleet(
    scheduler: Scheduler,
    agents: Vec<Agent>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!(agents = agents.len(), "standalone roles started");

    let mut handles = vec![tokio::spawn(scheduler.run(shutdown.clone()))];
    handles.extend(agents.into_iter().map(|agent| tokio::spawn(agent.run(shutdown.clone()))));

    for handle in handles {
        handle.await.context("standalone role panicked")?;
    }
    Ok(())
}

/// One agent per distinct instance id, all in the same service.
fn local_agents(
    store: &Store,
    config: &ConvoyConfig,
    mut instance_ids: Vec<String>,
    service: Option<String>,
) -> anyhow::Result<Vec<Agent>> {
    if instance_ids.is_empty() {
        instance_ids.extend(config.agent.instance_id.clone());
    }
    if instance_ids.is_empty() {
        bail!("no local instances: pass --instance-id or set agent.instance_id");
    }
    instance_ids.sort();
    instance_ids.dedup();

    let service = service
        .or_else(|| config.agent.service.clone())
        .context("no service: pass --service or set agent.service")?;

    Ok(instance_ids
        .into_iter()
        .map(|id| {
            let db = AgentDb::new(store.clone(), id, service.clone());
            Agent::new(
                db,
                Arc::new(LoggingSupervisor::new()),
                &config.agent,
                config.backoff.max(),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use convoy_core::Unit;
    use convoy_store::{AssignmentRecord, RedbBackend, StatusRecord};

    use super::*;

    fn memory_store() -> Store {
        Store::new(Arc::new(RedbBackend::open_in_memory().unwrap()))
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn local_agents_dedupe_ids_and_need_a_service() {
        let store = memory_store();
        let config = ConvoyConfig::default();

        let agents = local_agents(&store, &config, ids(&["i-2", "i-1", "i-2"]), Some("web".into())).unwrap();
        let names: Vec<&str> = agents.iter().map(|a| a.db().instance_id()).collect();
        assert_eq!(names, ["i-1", "i-2"]);

        assert!(local_agents(&store, &config, ids(&["i-1"]), None).is_err());
        assert!(local_agents(&store, &config, Vec::new(), Some("web".into())).is_err());
    }

    #[test]
    fn local_agents_fall_back_to_config_identity() {
        let mut config = ConvoyConfig::default();
        config.agent.instance_id = Some("i-9".to_string());
        config.agent.service = Some("api".to_string());

        let agents = local_agents(&memory_store(), &config, Vec::new(), None).unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].db().service(), "api");
    }

    #[tokio::test]
    async fn fleet_assigns_and_reports_on_one_store() {
        let store = memory_store();
        let units = vec![Unit::new("app.service", "[Service]")];
        let revision = convoy_agent::publish_revision(&store, &units).await.unwrap();
        let weights = convoy_core::ServiceWeights::new([(revision.hash.clone(), 1)].into()).unwrap();
        convoy_agent::set_weights(&store, "web", weights).await.unwrap();

        let mut config = ConvoyConfig::default();
        config.scheduler.interval_secs = 1;
        config.agent.sync_interval_secs = 1;
        config.agent.status_interval_secs = 1;

        let scheduler = Scheduler::from_config(store.clone(), &config).unwrap();
        let agents = local_agents(&store, &config, ids(&["i-1", "i-2"]), Some("web".into())).unwrap();
        let (tx, rx) = watch::channel(false);
        let fleet = tokio::spawn(run_fleet(scheduler, agents, rx));

        tokio::time::timeout(Duration::from_secs(15), async {
            loop {
                let mut settled = true;
                for id in ["i-1", "i-2"] {
                    let assigned = store.get_record::<AssignmentRecord>(id).await.unwrap();
                    let status = store.get_record::<StatusRecord>(id).await.unwrap();
                    let running = status.is_some_and(|s| s.units.contains_key("app.service"));
                    settled &= assigned.and_then(|a| a.assignment).as_ref() == Some(&revision.hash) && running;
                }
                if settled {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), fleet).await.unwrap().unwrap().unwrap();
    }
}
