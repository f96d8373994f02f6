//! Status reporting.
//!
//! Each report replaces the instance's status row wholesale; nothing from
//! an earlier report survives.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use convoy_store::records::STATUS_RESERVED;
use serde_json::Value;
use tracing::warn;

use crate::db::AgentDb;
use crate::error::AgentResult;

#[derive(Clone)]
pub struct StatusReporter {
    db: AgentDb,
}

impl StatusReporter {
    pub fn new(db: AgentDb) -> Self {
        Self { db }
    }

    /// Publish per-unit status, stamped with the current time.
    ///
    /// Unit names that collide with the row's own attributes are dropped.
    pub async fn publish(&self, statuses: BTreeMap<String, Value>) -> AgentResult<()> {
        self.publish_at(statuses, epoch_secs()).await
    }

    pub async fn publish_at(&self, statuses: BTreeMap<String, Value>, status_time: u64) -> AgentResult<()> {
        let units = statuses
            .into_iter()
            .filter(|(name, _)| {
                let reserved = STATUS_RESERVED.contains(&name.as_str());
                if reserved {
                    warn!(instance = %self.db.instance_id(), unit = %name, "unit name is reserved, not reported");
                }
                !reserved
            })
            .collect();
        self.db.store_status(units, status_time).await
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use convoy_store::{RedbBackend, StatusRecord, Store};
    use serde_json::json;

    use super::*;

    fn reporter() -> (StatusReporter, Store) {
        let store = Store::new(Arc::new(RedbBackend::open_in_memory().unwrap()));
        let db = AgentDb::new(store.clone(), "i-1", "web");
        (StatusReporter::new(db), store)
    }

    fn statuses(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn second_publish_replaces_the_first() {
        let (reporter, store) = reporter();
        reporter
            .publish_at(statuses(&[("a.service", json!({"active": "running"}))]), 100)
            .await
            .unwrap();
        reporter
            .publish_at(statuses(&[("b.service", json!({"active": "failed"}))]), 200)
            .await
            .unwrap();

        let row = store.get_record::<StatusRecord>("i-1").await.unwrap().unwrap();
        assert_eq!(row.service, "web");
        assert_eq!(row.status_time, 200);
        assert_eq!(row.units.keys().collect::<Vec<_>>(), vec!["b.service"]);
        assert_eq!(row.units["b.service"], json!({"active": "failed"}));
    }

    #[tokio::test]
    async fn reserved_unit_names_are_dropped() {
        let (reporter, store) = reporter();
        reporter
            .publish(statuses(&[("service", json!("oops")), ("ok.service", json!("up"))]))
            .await
            .unwrap();

        let row = store.get_record::<StatusRecord>("i-1").await.unwrap().unwrap();
        assert_eq!(row.service, "web");
        assert_eq!(row.units.len(), 1);
        assert!(row.status_time > 0);
    }
}
