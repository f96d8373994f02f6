//! Scheduler-side reads and writes against the coordination tables.

use std::collections::BTreeMap;

use convoy_core::{InstanceId, RevisionHash, Segment, ServiceName, ServiceWeights};
use convoy_store::records::is_fresh;
use convoy_store::tables::attr;
use convoy_store::{AssignmentRecord, IndexQuery, ServiceRecord, StatusRecord, Store, StoreResult, Table};
use tracing::{debug, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::planner::{AssignmentChange, AssignmentMap};

#[derive(Clone)]
pub struct SchedulerDb {
    store: Store,
    segment: Segment,
}

impl SchedulerDb {
    pub fn new(store: Store, segment: Segment) -> Self {
        Self { store, segment }
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Weights of every service in this scheduler's segment.
    ///
    /// Rows with invalid weights are logged and left out.
    pub async fn get_revision_weights(&self) -> SchedulerResult<BTreeMap<ServiceName, ServiceWeights>> {
        let records: Vec<ServiceRecord> = self.store.scan_records(self.segment).await?;
        let weights: BTreeMap<_, _> = records.into_iter().map(|r| (r.name, r.weights)).collect();
        debug!(
            segment = self.segment.index(),
            total_segments = self.segment.total(),
            services = weights.len(),
            "loaded service weights"
        );
        Ok(weights)
    }

    /// Full status rows of every instance reporting for `service`.
    pub async fn get_instances(&self, service: &str) -> SchedulerResult<Vec<StatusRecord>> {
        let records = self
            .store
            .query_records(IndexQuery::eq(attr::SERVICE, service))
            .await?;
        Ok(records)
    }

    /// Ids of the live population of `service`.
    ///
    /// With a TTL, instances whose last heartbeat is older than `ttl_secs`
    /// relative to `now` are left out.
    pub async fn get_population(
        &self,
        service: &str,
        ttl_secs: Option<u64>,
        now: u64,
    ) -> SchedulerResult<Vec<InstanceId>> {
        let query = IndexQuery::eq(attr::SERVICE, service).project([attr::INSTANCE_ID, attr::STATUS_TIME]);
        let items = self.store.query(Table::Status, query).await?;

        let mut population = Vec::with_capacity(items.len());
        let mut stale = 0usize;
        for item in items {
            let Some(instance) = item.get_str(attr::INSTANCE_ID) else {
                continue;
            };
            if ttl_secs.is_some_and(|ttl| !is_fresh(&item, now, ttl)) {
                stale += 1;
                continue;
            }
            population.push(instance.to_string());
        }
        population.sort();
        population.dedup();
        if stale > 0 {
            debug!(%service, stale, "excluded instances with stale heartbeats");
        }
        Ok(population)
    }

    /// Current assignment of each instance in `population`.
    ///
    /// Instances without an assignment row, or whose row names no
    /// revision, map to `None`.
    pub async fn get_instance_assignments(
        &self,
        service: &str,
        population: &[InstanceId],
    ) -> SchedulerResult<AssignmentMap> {
        let mut current: AssignmentMap = population.iter().map(|id| (id.clone(), None)).collect();
        let records: Vec<AssignmentRecord> = self.store.batch_get_records(population).await?;
        for record in records {
            if let Some(slot) = current.get_mut(&record.instance_id) {
                *slot = record.assignment;
            }
        }
        debug!(%service, instances = current.len(), "loaded current assignments");
        Ok(current)
    }

    /// Overwrite the assignment row of one instance.
    pub async fn set_assignment(
        &self,
        service: &str,
        instance_id: &str,
        revision: Option<&RevisionHash>,
    ) -> SchedulerResult<()> {
        self.put_assignment(service, instance_id, revision).await?;
        Ok(())
    }

    async fn put_assignment(
        &self,
        service: &str,
        instance_id: &str,
        revision: Option<&RevisionHash>,
    ) -> StoreResult<()> {
        let record = AssignmentRecord {
            instance_id: instance_id.to_string(),
            service: Some(service.to_string()),
            assignment: revision.cloned(),
        };
        self.store.put_record(&record, true).await
    }

    /// Write every change in order, stopping at the first failure.
    ///
    /// Returns the number of rows written. Changes already written stay
    /// written; the next pass recomputes the rest.
    pub async fn set_assignments(&self, service: &str, changes: &[AssignmentChange]) -> SchedulerResult<usize> {
        for (written, change) in changes.iter().enumerate() {
            if let Err(source) = self
                .put_assignment(service, &change.instance_id, change.to.as_ref())
                .await
            {
                warn!(
                    %service,
                    instance = %change.instance_id,
                    written,
                    planned = changes.len(),
                    error = %source,
                    "assignment write failed"
                );
                return Err(SchedulerError::PartialWrite {
                    written,
                    planned: changes.len(),
                    source,
                });
            }
        }
        Ok(changes.len())
    }
}
