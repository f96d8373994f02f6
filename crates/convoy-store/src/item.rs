//! Items: open attribute maps stored under a table key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::tables::Table;

/// A row in a coordination table.
///
/// Attribute sets are open (service rows carry one attribute per
/// revision), so an item is a plain name → JSON value map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item {
    attributes: BTreeMap<String, Value>,
}

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// A string attribute that must be present.
    pub fn require_str(&self, table: Table, name: &str) -> StoreResult<&str> {
        self.get_str(name)
            .ok_or_else(|| StoreError::malformed(table, format!("missing string attribute `{name}`")))
    }

    /// The item's key under `table`, if present and a string.
    pub fn key(&self, table: Table) -> Option<&str> {
        self.get_str(table.key_attribute())
    }

    /// Copy of this item restricted to the named attributes.
    pub fn project(&self, names: &[String]) -> Item {
        let attributes = names
            .iter()
            .filter_map(|n| self.attributes.get(n).map(|v| (n.clone(), v.clone())))
            .collect();
        Item { attributes }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes.iter()
    }

    pub fn into_attributes(self) -> BTreeMap<String, Value> {
        self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for Item {
    fn from(attributes: BTreeMap<String, Value>) -> Self {
        Self { attributes }
    }
}
