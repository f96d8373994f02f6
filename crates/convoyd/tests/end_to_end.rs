//! End-to-end rollout tests.
//!
//! Wires publishers, a scheduler, and several agents to one on-disk store
//! the way the daemon does, and walks a rollout from first deploy to full
//! cutover.

use std::collections::BTreeMap;
use std::sync::Arc;

use convoy_agent::{Agent, AgentDb, LoggingSupervisor, SyncOutcome, publish_revision, set_weights};
use convoy_core::{ConvoyConfig, RevisionHash, ServiceWeights, Unit};
use convoy_scheduler::Scheduler;
use convoy_store::{RedbBackend, StatusRecord, Store};

struct Fleet {
    store: Store,
    scheduler: Scheduler,
    agents: Vec<(Agent, Arc<LoggingSupervisor>)>,
    _dir: tempfile::TempDir,
}

fn fleet(instances: usize) -> Fleet {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("convoy.toml");
    std::fs::write(
        &config_path,
        format!(
            "[store]\npath = {:?}\ntimeout_ms = 2000\n\n[scheduler]\ninterval_secs = 5\n",
            dir.path().join("convoy.redb")
        ),
    )
    .unwrap();
    let config = ConvoyConfig::from_file(&config_path).unwrap();

    let backend = RedbBackend::open(&config.store.path).unwrap();
    let store = Store::from_config(Arc::new(backend), &config.store);
    let scheduler = Scheduler::from_config(store.clone(), &config).unwrap();
    let agents = (0..instances)
        .map(|i| {
            let supervisor = Arc::new(LoggingSupervisor::new());
            let db = AgentDb::new(store.clone(), format!("i-{i}"), "web");
            let agent = Agent::new(db, supervisor.clone(), &config.agent, config.backoff.max());
            (agent, supervisor)
        })
        .collect();
    Fleet {
        store,
        scheduler,
        agents,
        _dir: dir,
    }
}

impl Fleet {
    async fn report_all(&self) {
        for (agent, _) in &self.agents {
            agent.report_once().await.unwrap();
        }
    }

    async fn sync_all(&self) -> Vec<SyncOutcome> {
        let mut outcomes = Vec::new();
        for (agent, _) in &self.agents {
            outcomes.push(agent.sync_once().await.unwrap());
        }
        outcomes
    }

    fn running(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (_, supervisor) in &self.agents {
            for unit in supervisor.desired() {
                *counts.entry(unit.name).or_insert(0) += 1;
            }
        }
        counts
    }
}

async fn weights(store: &Store, pairs: &[(&RevisionHash, u64)]) {
    let w = ServiceWeights::new(pairs.iter().map(|(r, w)| ((*r).clone(), *w)).collect()).unwrap();
    set_weights(store, "web", w).await.unwrap();
}

#[tokio::test]
async fn rollout_from_first_deploy_to_cutover() {
    let f = fleet(4);
    let v1 = publish_revision(&f.store, &[Unit::new("web-v1.service", "[Service]\nExecStart=/srv/v1")])
        .await
        .unwrap();
    let v2 = publish_revision(&f.store, &[Unit::new("web-v2.service", "[Service]\nExecStart=/srv/v2")])
        .await
        .unwrap();

    // Nothing is assigned before the first scheduler pass.
    f.report_all().await;
    assert!(f.sync_all().await.iter().all(|o| *o == SyncOutcome::Unassigned));

    weights(&f.store, &[(&v1.hash, 1)]).await;
    let report = f.scheduler.reconcile_once().await.unwrap();
    assert_eq!(report.changed, 4);
    f.sync_all().await;
    assert_eq!(f.running(), BTreeMap::from([("web-v1.service".to_string(), 4)]));

    // Canary: one in four on v2.
    weights(&f.store, &[(&v1.hash, 3), (&v2.hash, 1)]).await;
    assert_eq!(f.scheduler.reconcile_once().await.unwrap().changed, 1);
    f.sync_all().await;
    assert_eq!(
        f.running(),
        BTreeMap::from([("web-v1.service".to_string(), 3), ("web-v2.service".to_string(), 1)])
    );

    // Cutover.
    weights(&f.store, &[(&v1.hash, 0), (&v2.hash, 1)]).await;
    assert_eq!(f.scheduler.reconcile_once().await.unwrap().changed, 3);
    f.sync_all().await;
    assert_eq!(f.running(), BTreeMap::from([("web-v2.service".to_string(), 4)]));

    // Settled: nothing left to write.
    assert_eq!(f.scheduler.reconcile_once().await.unwrap().changed, 0);
}

#[tokio::test]
async fn status_rows_follow_applied_units() {
    let f = fleet(2);
    let rev = publish_revision(
        &f.store,
        &[
            Unit::new("app.service", "[Service]"),
            Unit::new("cron.service", "[Service]").with_env("SCHEDULE", "hourly"),
        ],
    )
    .await
    .unwrap();
    weights(&f.store, &[(&rev.hash, 1)]).await;

    f.report_all().await;
    f.scheduler.reconcile_once().await.unwrap();
    f.sync_all().await;
    f.report_all().await;

    let instances = f.scheduler.db().get_instances("web").await.unwrap();
    assert_eq!(instances.len(), 2);
    for status in instances {
        assert_eq!(status.units.keys().collect::<Vec<_>>(), vec!["app.service", "cron.service"]);
    }
    let one = f.store.get_record::<StatusRecord>("i-0").await.unwrap().unwrap();
    assert_eq!(one.units["cron.service"]["state"], "desired");
}

#[tokio::test]
async fn late_joiner_does_not_disturb_the_fleet() {
    let f = fleet(3);
    let a = publish_revision(&f.store, &[Unit::new("a.service", "[Service]")]).await.unwrap();
    let b = publish_revision(&f.store, &[Unit::new("b.service", "[Service]")]).await.unwrap();
    weights(&f.store, &[(&a.hash, 1), (&b.hash, 1)]).await;

    // Only the first two instances have reported so far.
    for (agent, _) in &f.agents[..2] {
        agent.report_once().await.unwrap();
    }
    f.scheduler.reconcile_once().await.unwrap();
    let before: Vec<_> = f.agents[..2]
        .iter()
        .map(|(agent, _)| agent.db().clone())
        .collect();
    let mut assigned = Vec::new();
    for db in &before {
        assigned.push(db.get_assignment().await.unwrap());
    }

    f.agents[2].0.report_once().await.unwrap();
    assert_eq!(f.scheduler.reconcile_once().await.unwrap().changed, 1);
    for (db, prior) in before.iter().zip(assigned) {
        assert_eq!(db.get_assignment().await.unwrap(), prior);
    }
    assert!(f.agents[2].0.db().get_assignment().await.unwrap().is_some());
}
