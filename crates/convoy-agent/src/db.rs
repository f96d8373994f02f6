//! Agent-side store access.
//!
//! An agent reads its own assignment row, the revision it names, and that
//! revision's units, and overwrites its own status row. It touches no other
//! rows.

use std::collections::BTreeMap;

use convoy_core::{InstanceId, Revision, RevisionHash, ServiceName, UnitHash};
use convoy_store::{AssignmentRecord, StatusRecord, Store, UnitRecord};
use serde_json::Value;
use tracing::debug;

use crate::error::AgentResult;
use crate::resolver::{Resolution, resolve_units};

#[derive(Clone)]
pub struct AgentDb {
    store: Store,
    instance_id: InstanceId,
    service: ServiceName,
}

impl AgentDb {
    pub fn new(store: Store, instance_id: impl Into<InstanceId>, service: impl Into<ServiceName>) -> Self {
        Self {
            store,
            instance_id: instance_id.into(),
            service: service.into(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The revision this instance should run, `None` when unassigned.
    pub async fn get_assignment(&self) -> AgentResult<Option<RevisionHash>> {
        let record = self.store.get_record::<AssignmentRecord>(&self.instance_id).await?;
        Ok(record.and_then(|r| r.assignment))
    }

    pub async fn get_revision(&self, hash: &str) -> AgentResult<Option<Revision>> {
        Ok(self.store.get_record::<Revision>(hash).await?)
    }

    /// Batch-fetch unit rows; hashes with no row are simply absent.
    pub async fn batch_get_units(&self, hashes: &[UnitHash]) -> AgentResult<Vec<UnitRecord>> {
        Ok(self.store.batch_get_records::<UnitRecord>(hashes).await?)
    }

    /// Resolve the currently assigned revision, `None` when unassigned.
    pub async fn get_units(&self) -> AgentResult<Option<Resolution>> {
        let Some(revision) = self.get_assignment().await? else {
            debug!(instance = %self.instance_id, "no assignment");
            return Ok(None);
        };
        debug!(instance = %self.instance_id, %revision, "assigned, fetching units");
        let resolution = resolve_units(self, &revision).await?;
        Ok(Some(resolution))
    }

    /// Replace this instance's status row.
    pub async fn store_status(&self, units: BTreeMap<String, Value>, status_time: u64) -> AgentResult<()> {
        let record = StatusRecord {
            instance_id: self.instance_id.clone(),
            service: self.service.clone(),
            status_time,
            units,
        };
        self.store.put_record(&record, true).await?;
        debug!(instance = %self.instance_id, units = record.units.len(), "stored status");
        Ok(())
    }
}
