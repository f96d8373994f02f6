//! Scheduler: the reconciliation loop.
//!
//! Every pass reads the whole picture for the owned segment (weights,
//! live populations, current assignments), plans each service, and only
//! then writes the changed rows. A failed read aborts the pass before any
//! write; a failed write ends the pass and leaves earlier rows in place for
//! the next pass to converge from.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use convoy_core::config::SchedulerConfig;
use convoy_core::{Backoff, ConvoyConfig, ServiceName, ServiceWeights};
use convoy_store::Store;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::db::SchedulerDb;
use crate::error::SchedulerResult;
use crate::planner::{AssignmentMap, AssignmentPlan, plan};

/// Everything a pass knows about one service before it plans.
#[derive(Debug, Clone)]
pub struct ServiceSnapshot {
    pub service: ServiceName,
    pub weights: ServiceWeights,
    pub current: AssignmentMap,
}

/// Summary of one successful pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub services: usize,
    pub instances: usize,
    pub changed: usize,
}

pub struct Scheduler {
    db: SchedulerDb,
    status_ttl_secs: Option<u64>,
    backoff: Backoff,
}

impl Scheduler {
    pub fn new(db: SchedulerDb, config: &SchedulerConfig, backoff_max: Duration) -> Self {
        Self {
            db,
            status_ttl_secs: config.status_ttl_secs,
            backoff: Backoff::new(config.interval(), backoff_max),
        }
    }

    /// Build a scheduler for the segment named in `config`.
    pub fn from_config(store: Store, config: &ConvoyConfig) -> SchedulerResult<Self> {
        let segment = config.scheduler.segment()?;
        let db = SchedulerDb::new(store, segment);
        Ok(Self::new(db, &config.scheduler, config.backoff.max()))
    }

    pub fn db(&self) -> &SchedulerDb {
        &self.db
    }

    /// Read phase: weights for the segment, then population and current
    /// assignments for each service.
    pub async fn load_snapshot(&self, now: u64) -> SchedulerResult<Vec<ServiceSnapshot>> {
        let weights = self.db.get_revision_weights().await?;
        let mut snapshot = Vec::with_capacity(weights.len());
        for (service, weights) in weights {
            let population = self.db.get_population(&service, self.status_ttl_secs, now).await?;
            let current = self.db.get_instance_assignments(&service, &population).await?;
            snapshot.push(ServiceSnapshot {
                service,
                weights,
                current,
            });
        }
        Ok(snapshot)
    }

    /// Run one full read, plan, write pass.
    pub async fn reconcile_once(&self) -> SchedulerResult<PassReport> {
        let snapshot = self.load_snapshot(epoch_secs()).await?;

        let plans: Vec<AssignmentPlan> = snapshot
            .iter()
            .map(|s| plan(&s.service, &s.weights, &s.current))
            .collect();

        let mut report = PassReport {
            services: plans.len(),
            ..PassReport::default()
        };
        for plan in &plans {
            report.instances += plan.next.len();
            debug!(
                service = %plan.service,
                instances = plan.next.len(),
                targets = ?plan.targets,
                changes = plan.changes.len(),
                "planned service"
            );
            if plan.is_noop() {
                continue;
            }
            let written = self.db.set_assignments(&plan.service, &plan.changes).await?;
            report.changed += written;
            info!(service = %plan.service, changed = written, "assignments updated");
        }
        Ok(report)
    }

    /// Reconcile until `shutdown` fires. The first pass starts immediately.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let segment = self.db.segment();
        info!(
            segment = segment.index(),
            total_segments = segment.total(),
            interval_secs = self.backoff.next_interval().as_secs(),
            "scheduler started"
        );

        loop {
            let wait = match self.reconcile_once().await {
                Ok(report) => {
                    self.backoff.succeed();
                    debug!(
                        services = report.services,
                        instances = report.instances,
                        changed = report.changed,
                        "reconciliation pass complete"
                    );
                    self.backoff.next_interval()
                }
                Err(e) => {
                    let wait = self.backoff.fail();
                    warn!(
                        error = %e,
                        transient = e.is_transient(),
                        failures = self.backoff.consecutive_failures(),
                        retry_in_secs = wait.as_secs(),
                        "reconciliation pass failed"
                    );
                    wait
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
