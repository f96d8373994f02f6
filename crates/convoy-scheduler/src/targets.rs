//! Target instance counts per revision.
//!
//! Largest-remainder apportionment: every revision gets the floor of its
//! exact share, and the slots left over go to the largest fractional
//! remainders. Ties fall to the heavier revision, then the lexically
//! smaller hash, so the same input always yields the same targets.

use std::collections::BTreeMap;

use convoy_core::{RevisionHash, ServiceWeights};

/// How many of `population` instances each nonzero-weight revision should run.
///
/// The counts always sum to `population`, and each differs from the exact
/// share `weight / total * population` by less than one.
pub fn target_counts(weights: &ServiceWeights, population: usize) -> BTreeMap<RevisionHash, usize> {
    let total = weights.total();
    let mut targets = BTreeMap::new();
    if total == 0 || population == 0 {
        return targets;
    }

    let n = population as u128;
    let mut remainders = Vec::new();
    let mut assigned = 0usize;
    for (revision, weight) in weights.by_descending_weight() {
        let scaled = u128::from(weight) * n;
        let floor = (scaled / total) as usize;
        assigned += floor;
        targets.insert(revision.clone(), floor);
        remainders.push((revision, weight, scaled % total));
    }

    // Heaviest remainder first; by_descending_weight already ordered
    // equal remainders by weight then hash, and the sort is stable.
    remainders.sort_by(|a, b| b.2.cmp(&a.2));
    for (revision, _, _) in remainders.into_iter().take(population - assigned) {
        if let Some(count) = targets.get_mut(revision.as_str()) {
            *count += 1;
        }
    }
    targets
}
