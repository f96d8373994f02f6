//! Typed views of the five tables' items.
//!
//! Each record knows its table and how to map itself onto the wire
//! attribute names in [`crate::tables::attr`].

use std::collections::BTreeMap;

use convoy_core::{InstanceId, Revision, RevisionHash, ServiceName, ServiceWeights, Unit, UnitHash};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::item::Item;
use crate::tables::{Table, attr};

/// A row type stored in one of the coordination tables.
pub trait Record: Sized {
    const TABLE: Table;

    fn key(&self) -> &str;

    fn to_item(&self) -> StoreResult<Item>;

    fn from_item(item: Item) -> StoreResult<Self>;
}

// ── Status ─────────────────────────────────────────────────────────

/// Attributes of a status row that are not unit names.
pub const STATUS_RESERVED: [&str; 3] = [attr::INSTANCE_ID, attr::SERVICE, attr::STATUS_TIME];

/// An agent heartbeat: one serialized status per unit name.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub instance_id: InstanceId,
    pub service: ServiceName,
    /// Unix timestamp (seconds) when the agent published this row.
    pub status_time: u64,
    pub units: BTreeMap<String, Value>,
}

impl Record for StatusRecord {
    const TABLE: Table = Table::Status;

    fn key(&self) -> &str {
        &self.instance_id
    }

    fn to_item(&self) -> StoreResult<Item> {
        let mut item = Item::new()
            .with(attr::INSTANCE_ID, self.instance_id.as_str())
            .with(attr::SERVICE, self.service.as_str())
            .with(attr::STATUS_TIME, self.status_time);
        for (unit, status) in &self.units {
            if STATUS_RESERVED.contains(&unit.as_str()) {
                return Err(StoreError::malformed(
                    Table::Status,
                    format!("unit name `{unit}` collides with a reserved attribute"),
                ));
            }
            let blob = serde_json::to_string(status).map_err(|e| StoreError::Serialize(e.to_string()))?;
            item.set(unit.as_str(), blob);
        }
        Ok(item)
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        let instance_id = item.require_str(Table::Status, attr::INSTANCE_ID)?.to_string();
        let service = item.require_str(Table::Status, attr::SERVICE)?.to_string();
        let status_time = status_time(&item).unwrap_or(0);
        let units = item
            .into_attributes()
            .into_iter()
            .filter(|(name, _)| !STATUS_RESERVED.contains(&name.as_str()))
            .map(|(name, value)| {
                let status = match value {
                    Value::String(blob) => serde_json::from_str(&blob).unwrap_or(Value::String(blob)),
                    other => other,
                };
                (name, status)
            })
            .collect();
        Ok(Self {
            instance_id,
            service,
            status_time,
            units,
        })
    }
}

/// Heartbeat time of a (possibly projected) status item.
pub fn status_time(item: &Item) -> Option<u64> {
    item.get(attr::STATUS_TIME).and_then(epoch_secs_value)
}

/// Whether a status item heartbeated within `ttl_secs` of `now`. Items
/// without a readable `status_time` are stale.
pub fn is_fresh(item: &Item, now: u64, ttl_secs: u64) -> bool {
    status_time(item).is_some_and(|at| now.saturating_sub(at) <= ttl_secs)
}

/// Accept integer or fractional epoch seconds.
fn epoch_secs_value(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

// ── Assignment ─────────────────────────────────────────────────────

/// The scheduler's decision for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRecord {
    pub instance_id: InstanceId,
    pub service: Option<ServiceName>,
    /// `None` means no units should run.
    pub assignment: Option<RevisionHash>,
}

impl Record for AssignmentRecord {
    const TABLE: Table = Table::Assignments;

    fn key(&self) -> &str {
        &self.instance_id
    }

    fn to_item(&self) -> StoreResult<Item> {
        let mut item = Item::new().with(attr::INSTANCE_ID, self.instance_id.as_str());
        if let Some(service) = &self.service {
            item.set(attr::SERVICE, service.as_str());
        }
        if let Some(revision) = &self.assignment {
            item.set(attr::ASSIGNMENT, revision.as_str());
        }
        Ok(item)
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        Ok(Self {
            instance_id: item.require_str(Table::Assignments, attr::INSTANCE_ID)?.to_string(),
            service: item.get_str(attr::SERVICE).map(str::to_string),
            assignment: item.get_str(attr::ASSIGNMENT).map(str::to_string),
        })
    }
}

// ── Service ────────────────────────────────────────────────────────

/// A service row: every non-key attribute is a revision weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: ServiceName,
    pub weights: ServiceWeights,
}

impl Record for ServiceRecord {
    const TABLE: Table = Table::Services;

    fn key(&self) -> &str {
        &self.name
    }

    fn to_item(&self) -> StoreResult<Item> {
        let mut item = Item::new().with(attr::SERVICE_NAME, self.name.as_str());
        for (revision, weight) in self.weights.iter() {
            item.set(revision.as_str(), weight);
        }
        Ok(item)
    }

    fn from_item(mut item: Item) -> StoreResult<Self> {
        let name = item.require_str(Table::Services, attr::SERVICE_NAME)?.to_string();
        item.remove(attr::SERVICE_NAME);
        let weights = ServiceWeights::from_attributes(item.attributes())
            .map_err(|e| StoreError::malformed(Table::Services, format!("service {name}: {e}")))?;
        Ok(Self { name, weights })
    }
}

// ── Revision ───────────────────────────────────────────────────────

impl Record for Revision {
    const TABLE: Table = Table::Revisions;

    fn key(&self) -> &str {
        &self.hash
    }

    fn to_item(&self) -> StoreResult<Item> {
        Ok(Item::new()
            .with(attr::REV_HASH, self.hash.as_str())
            .with(attr::UNITS, self.units.clone()))
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        let hash = item.require_str(Table::Revisions, attr::REV_HASH)?.to_string();
        let units = item
            .get(attr::UNITS)
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::malformed(Table::Revisions, format!("revision {hash} has no unit list")))?
            .iter()
            .map(|u| u.as_str().map(str::to_string))
            .collect::<Option<Vec<UnitHash>>>()
            .ok_or_else(|| StoreError::malformed(Table::Revisions, format!("revision {hash} lists a non-string unit")))?;
        Ok(Self { hash, units })
    }
}

// ── Unit ───────────────────────────────────────────────────────────

/// A unit definition stored under its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    pub hash: UnitHash,
    pub unit: Unit,
}

impl UnitRecord {
    /// Wrap a unit under its own content hash.
    pub fn new(unit: Unit) -> Self {
        Self {
            hash: unit.content_hash(),
            unit,
        }
    }
}

impl Record for UnitRecord {
    const TABLE: Table = Table::Units;

    fn key(&self) -> &str {
        &self.hash
    }

    fn to_item(&self) -> StoreResult<Item> {
        let environment: serde_json::Map<String, Value> = self
            .unit
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Ok(Item::new()
            .with(attr::UNIT_HASH, self.hash.as_str())
            .with(attr::NAME, self.unit.name.as_str())
            .with(attr::UNIT_FILE, self.unit.unit_file.as_str())
            .with(attr::ENVIRONMENT, Value::Object(environment)))
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        let hash = item.require_str(Table::Units, attr::UNIT_HASH)?.to_string();
        let name = item.require_str(Table::Units, attr::NAME)?.to_string();
        let unit_file = item.require_str(Table::Units, attr::UNIT_FILE)?.to_string();
        let environment = match item.get(attr::ENVIRONMENT) {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
            Some(_) => {
                return Err(StoreError::malformed(
                    Table::Units,
                    format!("unit {hash} environment is not a mapping"),
                ));
            }
        };
        Ok(Self {
            hash,
            unit: Unit {
                name,
                unit_file,
                environment,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_unit_blobs_as_strings() {
        let record = StatusRecord {
            instance_id: "i-1".to_string(),
            service: "web".to_string(),
            status_time: 1_700_000_000,
            units: [("web.service".to_string(), json!({"active": "running"}))]
                .into_iter()
                .collect(),
        };
        let item = record.to_item().unwrap();
        assert_eq!(item.get_str("web.service"), Some(r#"{"active":"running"}"#));
        assert_eq!(item.get("status_time"), Some(&json!(1_700_000_000u64)));

        let back = StatusRecord::from_item(item).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn status_rejects_reserved_unit_names() {
        let record = StatusRecord {
            instance_id: "i-1".to_string(),
            service: "web".to_string(),
            status_time: 1,
            units: [("service".to_string(), json!("x"))].into_iter().collect(),
        };
        assert!(record.to_item().is_err());
    }

    #[test]
    fn status_accepts_fractional_time_and_raw_blobs() {
        let item = Item::new()
            .with("instance_id", "i-1")
            .with("service", "web")
            .with("status_time", 1234.9)
            .with("legacy.service", "not json");
        let record = StatusRecord::from_item(item).unwrap();
        assert_eq!(record.status_time, 1234);
        assert_eq!(record.units["legacy.service"], json!("not json"));
    }

    #[test]
    fn status_freshness() {
        let item = Item::new().with(attr::INSTANCE_ID, "i-1").with(attr::STATUS_TIME, 100);
        assert!(is_fresh(&item, 160, 60));
        assert!(!is_fresh(&item, 161, 60));
        assert!(is_fresh(&item, 50, 0));
        assert!(!is_fresh(&Item::new().with(attr::INSTANCE_ID, "i-2"), 0, 60));
    }

    #[test]
    fn unassigned_record_omits_assignment_attribute() {
        let record = AssignmentRecord {
            instance_id: "i-1".to_string(),
            service: Some("web".to_string()),
            assignment: None,
        };
        let item = record.to_item().unwrap();
        assert!(!item.contains("assignment"));
        assert_eq!(AssignmentRecord::from_item(item).unwrap(), record);
    }

    #[test]
    fn service_row_validates_weights() {
        let item = Item::new()
            .with("service_name", "web")
            .with("rev-a", 3)
            .with("rev-b", "1");
        let record = ServiceRecord::from_item(item).unwrap();
        assert_eq!(record.weights.get("rev-a"), 3);
        assert_eq!(record.weights.get("rev-b"), 1);

        let zero = Item::new().with("service_name", "idle").with("rev-a", 0);
        assert!(matches!(
            ServiceRecord::from_item(zero),
            Err(StoreError::Malformed { table: Table::Services, .. })
        ));
    }

    #[test]
    fn revision_requires_string_unit_list() {
        let bad = Item::new().with("rev_hash", "r").with("units", json!([1, 2]));
        assert!(Revision::from_item(bad).is_err());
        let missing = Item::new().with("rev_hash", "r");
        assert!(Revision::from_item(missing).is_err());
    }

    #[test]
    fn unit_record_wire_shape() {
        let record = UnitRecord::new(Unit::new("web.service", "[Service]").with_env("PORT", "80"));
        let item = record.to_item().unwrap();
        assert_eq!(item.get("environment"), Some(&json!({"PORT": "80"})));
        assert_eq!(item.key(Table::Units), Some(record.hash.as_str()));
        assert_eq!(UnitRecord::from_item(item).unwrap(), record);
    }
}
