//! Agent: the per-instance polling loop.
//!
//! Two cadences share one task: a sync pass (assignment → units →
//! supervisor) on `sync_interval`, backing off on failure, and a status
//! report on `status_interval`.

use std::sync::Arc;
use std::time::Duration;

use convoy_core::config::AgentConfig;
use convoy_core::{Backoff, RevisionHash, UnitHash};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::db::AgentDb;
use crate::error::{AgentError, AgentResult};
use crate::status::StatusReporter;
use crate::supervisor::UnitSupervisor;

/// What one sync pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No assignment: the supervisor was told to run nothing.
    Unassigned,
    /// The resolved set was handed to the supervisor.
    Applied {
        revision: RevisionHash,
        units: usize,
        missing: Vec<UnitHash>,
    },
    /// The assigned revision has no row; the supervisor was not called.
    DanglingRevision(RevisionHash),
}

pub struct Agent {
    db: AgentDb,
    reporter: StatusReporter,
    supervisor: Arc<dyn UnitSupervisor>,
    status_interval: Duration,
    backoff: Backoff,
}

impl Agent {
    pub fn new(
        db: AgentDb,
        supervisor: Arc<dyn UnitSupervisor>,
        config: &AgentConfig,
        backoff_max: Duration,
    ) -> Self {
        Self {
            reporter: StatusReporter::new(db.clone()),
            db,
            supervisor,
            // `interval` panics on a zero period.
            status_interval: config.status_interval().max(Duration::from_millis(1)),
            backoff: Backoff::new(config.sync_interval(), backoff_max),
        }
    }

    pub fn db(&self) -> &AgentDb {
        &self.db
    }

    /// Fetch the assignment, resolve it, and apply it.
    ///
    /// On any store error the supervisor is left alone, so whatever it was
    /// running keeps running.
    pub async fn sync_once(&self) -> AgentResult<SyncOutcome> {
        let resolution = match self.db.get_units().await {
            Ok(resolution) => resolution,
            Err(AgentError::UnknownRevision(revision)) => {
                warn!(instance = %self.db.instance_id(), %revision, "assigned revision not found");
                return Ok(SyncOutcome::DanglingRevision(revision));
            }
            Err(e) => return Err(e),
        };

        let Some(resolution) = resolution else {
            self.supervisor.apply(&[]).await.map_err(AgentError::Supervisor)?;
            return Ok(SyncOutcome::Unassigned);
        };

        self.supervisor
            .apply(&resolution.units)
            .await
            .map_err(AgentError::Supervisor)?;
        Ok(SyncOutcome::Applied {
            revision: resolution.revision.hash,
            units: resolution.units.len(),
            missing: resolution.missing,
        })
    }

    /// Publish the supervisor's current status.
    pub async fn report_once(&self) -> AgentResult<()> {
        self.reporter.publish(self.supervisor.status()).await
    }

    /// Poll and report until `shutdown` fires. Both start immediately.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            instance = %self.db.instance_id(),
            service = %self.db.service(),
            sync_interval_secs = self.backoff.next_interval().as_secs(),
            status_interval_secs = self.status_interval.as_secs(),
            "agent started"
        );

        let mut status_tick = tokio::time::interval(self.status_interval);
        status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_sync = Instant::now();

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_sync) => {
                    let wait = match self.sync_once().await {
                        Ok(outcome) => {
                            self.backoff.succeed();
                            debug!(instance = %self.db.instance_id(), ?outcome, "sync pass complete");
                            self.backoff.next_interval()
                        }
                        Err(e) => {
                            let wait = self.backoff.fail();
                            warn!(
                                instance = %self.db.instance_id(),
                                error = %e,
                                failures = self.backoff.consecutive_failures(),
                                retry_in_secs = wait.as_secs(),
                                "sync pass failed"
                            );
                            wait
                        }
                    };
                    next_sync = Instant::now() + wait;
                }
                _ = status_tick.tick() => {
                    if let Err(e) = self.report_once().await {
                        warn!(instance = %self.db.instance_id(), error = %e, "status report failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!(instance = %self.db.instance_id(), "agent shutting down");
                    break;
                }
            }
        }
    }
}
