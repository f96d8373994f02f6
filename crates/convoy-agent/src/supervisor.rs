//! The seam between the agent and whatever actually runs units.
//!
//! The agent hands the supervisor the full desired unit set on every sync
//! and asks it for per-unit status on every report. Working out what
//! changed between two sets is the supervisor's job.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use convoy_core::Unit;
use serde_json::{Value, json};
use tracing::info;

pub type SupervisorFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

pub trait UnitSupervisor: Send + Sync {
    /// Make `units` the running set. An empty slice stops everything.
    fn apply<'a>(&'a self, units: &'a [Unit]) -> SupervisorFuture<'a>;

    /// Current status of each unit, keyed by unit name.
    fn status(&self) -> BTreeMap<String, Value>;
}

/// Dry-run supervisor: records and logs the desired set without running it.
#[derive(Debug, Default)]
pub struct LoggingSupervisor {
    state: Mutex<Applied>,
}

#[derive(Debug, Default)]
struct Applied {
    units: Vec<Unit>,
    applies: u64,
}

impl LoggingSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last unit set handed to `apply`.
    pub fn desired(&self) -> Vec<Unit> {
        self.lock().units.clone()
    }

    /// How many times `apply` has been called.
    pub fn applies(&self) -> u64 {
        self.lock().applies
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Applied> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl UnitSupervisor for LoggingSupervisor {
    fn apply<'a>(&'a self, units: &'a [Unit]) -> SupervisorFuture<'a> {
        let mut state = self.lock();
        if state.units != units {
            let names: Vec<&str> = units.iter().map(|u| u.name.as_str()).collect();
            info!(units = ?names, "desired unit set changed");
        }
        state.units = units.to_vec();
        state.applies += 1;
        Box::pin(std::future::ready(Ok(())))
    }

    fn status(&self) -> BTreeMap<String, Value> {
        self.lock()
            .units
            .iter()
            .map(|unit| {
                let status = json!({
                    "state": "desired",
                    "unit_hash": unit.content_hash(),
                });
                (unit.name.clone(), status)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_last_applied_set() {
        let supervisor = LoggingSupervisor::new();
        let units = vec![Unit::new("web.service", "[Service]")];
        supervisor.apply(&units).await.unwrap();
        assert_eq!(supervisor.desired(), units);

        let status = supervisor.status();
        assert_eq!(status["web.service"]["state"], "desired");

        supervisor.apply(&[]).await.unwrap();
        assert!(supervisor.desired().is_empty());
        assert!(supervisor.status().is_empty());
        assert_eq!(supervisor.applies(), 2);
    }
}
