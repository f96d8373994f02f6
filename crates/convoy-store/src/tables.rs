//! The five coordination tables and their wire attribute names.
//!
//! Attribute names are the contract with the store and must not change.

use std::fmt;

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

/// Agent heartbeats keyed by `instance_id`.
pub const STATUS: TableDefinition<&str, &[u8]> = TableDefinition::new("status");

/// Scheduler decisions keyed by `instance_id`.
pub const ASSIGNMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("assignments");

/// Revision weights keyed by `service_name`.
pub const SERVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Revision unit lists keyed by `rev_hash`.
pub const REVISIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("revisions");

/// Unit definitions keyed by `unit_hash`.
pub const UNITS: TableDefinition<&str, &[u8]> = TableDefinition::new("units");

pub mod attr {
    pub const INSTANCE_ID: &str = "instance_id";
    pub const SERVICE: &str = "service";
    pub const STATUS_TIME: &str = "status_time";
    pub const ASSIGNMENT: &str = "assignment";
    pub const SERVICE_NAME: &str = "service_name";
    pub const REV_HASH: &str = "rev_hash";
    pub const UNITS: &str = "units";
    pub const UNIT_HASH: &str = "unit_hash";
    pub const NAME: &str = "name";
    pub const UNIT_FILE: &str = "unit_file";
    pub const ENVIRONMENT: &str = "environment";
}

/// Logical table in the coordination store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Status,
    Assignments,
    Services,
    Revisions,
    Units,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Status,
        Table::Assignments,
        Table::Services,
        Table::Revisions,
        Table::Units,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Status => "status",
            Table::Assignments => "assignments",
            Table::Services => "services",
            Table::Revisions => "revisions",
            Table::Units => "units",
        }
    }

    /// Attribute holding the item key.
    pub fn key_attribute(self) -> &'static str {
        match self {
            Table::Status | Table::Assignments => attr::INSTANCE_ID,
            Table::Services => attr::SERVICE_NAME,
            Table::Revisions => attr::REV_HASH,
            Table::Units => attr::UNIT_HASH,
        }
    }

    pub(crate) fn definition(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Table::Status => STATUS,
            Table::Assignments => ASSIGNMENTS,
            Table::Services => SERVICES,
            Table::Revisions => REVISIONS,
            Table::Units => UNITS,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
