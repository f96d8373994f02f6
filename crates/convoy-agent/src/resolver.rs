//! Revision → unit resolution.

use std::collections::HashMap;

use convoy_core::{Revision, Unit, UnitHash};
use tracing::{debug, warn};

use crate::db::AgentDb;
use crate::error::{AgentError, AgentResult};

/// The units of one revision, in the revision's order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub revision: Revision,
    pub units: Vec<Unit>,
    /// Unit hashes listed by the revision that have no unit row.
    pub missing: Vec<UnitHash>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Fetch a revision and its units.
///
/// A revision without a row is [`AgentError::UnknownRevision`]. Units
/// without a row are left out of the set and listed in `missing`.
pub async fn resolve_units(db: &AgentDb, hash: &str) -> AgentResult<Resolution> {
    let revision = db
        .get_revision(hash)
        .await?
        .ok_or_else(|| AgentError::UnknownRevision(hash.to_string()))?;
    if !revision.is_consistent() {
        warn!(revision = %revision.hash, "revision hash does not match its unit list");
    }

    let found: HashMap<UnitHash, Unit> = db
        .batch_get_units(&revision.units)
        .await?
        .into_iter()
        .map(|record| (record.hash, record.unit))
        .collect();

    let mut units = Vec::with_capacity(revision.units.len());
    let mut missing = Vec::new();
    for unit_hash in &revision.units {
        // A hash listed twice yields the unit twice.
        match found.get(unit_hash) {
            Some(unit) => units.push(unit.clone()),
            None => {
                warn!(revision = %revision.hash, unit = %unit_hash, "unknown unit, skipping");
                missing.push(unit_hash.clone());
            }
        }
    }

    debug!(revision = %revision.hash, units = units.len(), missing = missing.len(), "resolved revision");
    Ok(Resolution {
        revision,
        units,
        missing,
    })
}
