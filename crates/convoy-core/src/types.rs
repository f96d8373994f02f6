//! Shared types used across Convoy crates.
//!
//! Units and revisions are content-addressed: their keys are SHA-256
//! digests of what they contain, so a given hash always names the same
//! immutable definition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier of a worker machine running an agent.
pub type InstanceId = String;

/// Name of a deployable workload.
pub type ServiceName = String;

/// Hex SHA-256 digest identifying a revision.
pub type RevisionHash = String;

/// Hex SHA-256 digest identifying a unit.
pub type UnitHash = String;

/// A single work-item definition handed to the unit supervisor.
///
/// The `unit_file` template is opaque to Convoy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub unit_file: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl Unit {
    pub fn new(name: impl Into<String>, unit_file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit_file: unit_file.into(),
            environment: BTreeMap::new(),
        }
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Content address of this unit.
    ///
    /// Every field is length-prefixed so that `("ab", "c")` and `("a", "bc")`
    /// never collide. Environment entries are hashed in key order.
    pub fn content_hash(&self) -> UnitHash {
        let mut hasher = Sha256::new();
        write_field(&mut hasher, self.name.as_bytes());
        write_field(&mut hasher, self.unit_file.as_bytes());
        hasher.update((self.environment.len() as u64).to_be_bytes());
        for (key, value) in &self.environment {
            write_field(&mut hasher, key.as_bytes());
            write_field(&mut hasher, value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// An immutable, ordered set of units: one deployable version of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub hash: RevisionHash,
    pub units: Vec<UnitHash>,
}

impl Revision {
    /// Build a revision from unit hashes, deriving its content address.
    pub fn from_unit_hashes(units: Vec<UnitHash>) -> Self {
        let hash = revision_hash(&units);
        Self { hash, units }
    }

    /// Build a revision from unit definitions.
    pub fn from_units(units: &[Unit]) -> Self {
        Self::from_unit_hashes(units.iter().map(Unit::content_hash).collect())
    }

    /// Whether `hash` is the digest of `units`.
    pub fn is_consistent(&self) -> bool {
        revision_hash(&self.units) == self.hash
    }
}

/// Digest of an ordered sequence of unit hashes.
pub fn revision_hash(units: &[UnitHash]) -> RevisionHash {
    let mut hasher = Sha256::new();
    hasher.update((units.len() as u64).to_be_bytes());
    for unit in units {
        write_field(&mut hasher, unit.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_unit() -> Unit {
        Unit::new("web.service", "[Service]\nExecStart=/usr/bin/web")
            .with_env("PORT", "8080")
            .with_env("MODE", "prod")
    }

    #[test]
    fn unit_hash_is_stable_hex_sha256() {
        let hash = web_unit().content_hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, web_unit().content_hash());
    }

    #[test]
    fn unit_hash_ignores_env_insertion_order() {
        let a = Unit::new("u", "f").with_env("A", "1").with_env("B", "2");
        let b = Unit::new("u", "f").with_env("B", "2").with_env("A", "1");
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn unit_hash_field_boundaries_matter() {
        let a = Unit::new("ab", "c");
        let b = Unit::new("a", "bc");
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn unit_hash_changes_with_env() {
        let a = web_unit();
        let b = web_unit().with_env("PORT", "9090");
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn revision_hash_is_order_sensitive() {
        let u1 = Unit::new("a", "x").content_hash();
        let u2 = Unit::new("b", "y").content_hash();
        let forward = Revision::from_unit_hashes(vec![u1.clone(), u2.clone()]);
        let reverse = Revision::from_unit_hashes(vec![u2, u1]);
        assert_ne!(forward.hash, reverse.hash);
        assert!(forward.is_consistent());
    }

    #[test]
    fn revision_from_units_matches_hashes() {
        let units = vec![web_unit(), Unit::new("worker.service", "[Service]")];
        let rev = Revision::from_units(&units);
        assert_eq!(rev.units.len(), 2);
        assert_eq!(rev.units[0], units[0].content_hash());
        assert!(rev.is_consistent());
    }

    #[test]
    fn tampered_revision_is_inconsistent() {
        let mut rev = Revision::from_units(&[web_unit()]);
        rev.units.push("deadbeef".to_string());
        assert!(!rev.is_consistent());
    }
}
