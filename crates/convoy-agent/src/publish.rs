//! Publishing revisions and setting weights.
//!
//! Unit and revision rows are content-addressed and written once. Writing
//! a row that already exists with identical content is a no-op; the same
//! key with different content is a conflict.

use convoy_core::{Revision, ServiceWeights, Unit};
use convoy_store::{Record, ServiceRecord, Store, StoreError, UnitRecord};
use tracing::{debug, info};

use crate::error::AgentResult;

/// Store every unit, then the revision that lists them.
///
/// Units go first so that an agent never sees a revision whose units
/// were not yet written by this call.
pub async fn publish_revision(store: &Store, units: &[Unit]) -> AgentResult<Revision> {
    for unit in units {
        let record = UnitRecord::new(unit.clone());
        put_once(store, &record).await?;
        debug!(unit = %record.unit.name, hash = %record.hash, "unit stored");
    }
    let revision = Revision::from_units(units);
    put_once(store, &revision).await?;
    info!(revision = %revision.hash, units = revision.units.len(), "revision published");
    Ok(revision)
}

/// Replace a service's weights.
pub async fn set_weights(store: &Store, service: &str, weights: ServiceWeights) -> AgentResult<()> {
    let record = ServiceRecord {
        name: service.to_string(),
        weights,
    };
    store.put_record(&record, true).await?;
    info!(%service, revisions = record.weights.len(), "service weights set");
    Ok(())
}

async fn put_once<R>(store: &Store, record: &R) -> AgentResult<()>
where
    R: Record + PartialEq,
{
    match store.put_record(record, false).await {
        Ok(()) => Ok(()),
        Err(conflict @ StoreError::Conflict { .. }) => match store.get_record::<R>(record.key()).await? {
            Some(existing) if existing == *record => Ok(()),
            _ => Err(conflict.into()),
        },
        Err(e) => Err(e.into()),
    }
}
