//! Per-service revision weights.
//!
//! A service row in the store carries an open set of attributes: every
//! attribute other than the key is a revision hash mapped to an integer
//! weight. `ServiceWeights` is the validated form of that row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::RevisionHash;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WeightError {
    #[error("service has no revisions")]
    Empty,

    #[error("all revision weights are zero")]
    AllZero,

    #[error("invalid weight for revision {revision}: {value}")]
    Invalid { revision: RevisionHash, value: String },
}

/// Validated revision → weight mapping for one service.
///
/// Weights are non-negative and at least one is nonzero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<RevisionHash, u64>", into = "BTreeMap<RevisionHash, u64>")]
pub struct ServiceWeights {
    weights: BTreeMap<RevisionHash, u64>,
}

impl ServiceWeights {
    pub fn new(weights: BTreeMap<RevisionHash, u64>) -> Result<Self, WeightError> {
        if weights.is_empty() {
            return Err(WeightError::Empty);
        }
        if weights.values().all(|w| *w == 0) {
            return Err(WeightError::AllZero);
        }
        Ok(Self { weights })
    }

    /// Parse the dynamic attributes of a service row.
    ///
    /// Accepts JSON integers and decimal strings; anything else (negative,
    /// fractional, non-numeric) rejects the whole row.
    pub fn from_attributes<'a, I>(attributes: I) -> Result<Self, WeightError>
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let mut weights = BTreeMap::new();
        for (revision, value) in attributes {
            let weight = parse_weight(value).ok_or_else(|| WeightError::Invalid {
                revision: revision.clone(),
                value: value.to_string(),
            })?;
            weights.insert(revision.clone(), weight);
        }
        Self::new(weights)
    }

    /// Weight of a revision, zero if it is not listed.
    pub fn get(&self, revision: &str) -> u64 {
        self.weights.get(revision).copied().unwrap_or(0)
    }

    /// Sum of all weights. Widened so that large weights cannot overflow.
    pub fn total(&self) -> u128 {
        self.weights.values().map(|w| u128::from(*w)).sum()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RevisionHash, u64)> {
        self.weights.iter().map(|(rev, w)| (rev, *w))
    }

    /// Revisions with nonzero weight, heaviest first, ties by hash.
    pub fn by_descending_weight(&self) -> Vec<(&RevisionHash, u64)> {
        let mut active: Vec<_> = self.iter().filter(|(_, w)| *w > 0).collect();
        active.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        active
    }

    /// The lightest revision with nonzero weight, ties by hash.
    pub fn lightest(&self) -> Option<&RevisionHash> {
        self.iter()
            .filter(|(_, w)| *w > 0)
            .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(rev, _)| rev)
    }

    pub fn as_map(&self) -> &BTreeMap<RevisionHash, u64> {
        &self.weights
    }
}

impl TryFrom<BTreeMap<RevisionHash, u64>> for ServiceWeights {
    type Error = WeightError;

    fn try_from(weights: BTreeMap<RevisionHash, u64>) -> Result<Self, Self::Error> {
        Self::new(weights)
    }
}

impl From<ServiceWeights> for BTreeMap<RevisionHash, u64> {
    fn from(weights: ServiceWeights) -> Self {
        weights.weights
    }
}

fn parse_weight(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weights(pairs: &[(&str, u64)]) -> ServiceWeights {
        ServiceWeights::new(pairs.iter().map(|(r, w)| (r.to_string(), *w)).collect()).unwrap()
    }

    #[test]
    fn rejects_empty_and_all_zero() {
        assert_eq!(ServiceWeights::new(BTreeMap::new()), Err(WeightError::Empty));
        let zeros = [("a".to_string(), 0), ("b".to_string(), 0)].into_iter().collect();
        assert_eq!(ServiceWeights::new(zeros), Err(WeightError::AllZero));
    }

    #[test]
    fn parses_numbers_and_numeric_strings() {
        let attrs: BTreeMap<String, Value> = [
            ("rev-a".to_string(), json!(3)),
            ("rev-b".to_string(), json!("1")),
            ("rev-c".to_string(), json!(0)),
        ]
        .into_iter()
        .collect();

        let parsed = ServiceWeights::from_attributes(&attrs).unwrap();
        assert_eq!(parsed.get("rev-a"), 3);
        assert_eq!(parsed.get("rev-b"), 1);
        assert_eq!(parsed.get("rev-c"), 0);
        assert_eq!(parsed.get("missing"), 0);
        assert_eq!(parsed.total(), 4);
    }

    #[test]
    fn rejects_negative_fractional_and_text() {
        for bad in [json!(-1), json!(1.5), json!("lots"), json!(null), json!([1])] {
            let attrs: BTreeMap<String, Value> = [("rev".to_string(), bad)].into_iter().collect();
            assert!(matches!(
                ServiceWeights::from_attributes(&attrs),
                Err(WeightError::Invalid { .. })
            ));
        }
    }

    #[test]
    fn descending_order_breaks_ties_by_hash() {
        let w = weights(&[("b", 1), ("a", 1), ("c", 5), ("z", 0)]);
        let order: Vec<_> = w.by_descending_weight().into_iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn lightest_skips_zero_weights() {
        let w = weights(&[("heavy", 9), ("zero", 0), ("light-b", 2), ("light-a", 2)]);
        assert_eq!(w.lightest().map(String::as_str), Some("light-a"));
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: ServiceWeights = serde_json::from_str(r#"{"a":1,"b":0}"#).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<ServiceWeights>(r#"{"a":0}"#).is_err());
    }
}
