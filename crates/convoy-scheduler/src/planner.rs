//! Stable proportional assignment.
//!
//! Given a service's weights and the current assignment of every live
//! instance, compute the next assignment: each revision ends up with its
//! target count, and as few instances as possible change revision.
//!
//! 1. Instances already on a weighted revision keep it, up to that
//!    revision's target (lowest instance ids first).
//! 2. Everyone else (unassigned, on a retired or unknown revision, or
//!    overflow) is queued in ascending instance id order.
//! 3. Revisions below target, heaviest first, take instances from the queue.
//! 4. Anything still queued goes to the lightest weighted revision.
//!
//! The planner is pure; reading and writing the store is the scheduler's job.

use std::collections::{BTreeMap, BTreeSet};

use convoy_core::{InstanceId, RevisionHash, ServiceName, ServiceWeights};

use crate::targets::target_counts;

/// Assignment of each instance in a population; `None` means unassigned.
pub type AssignmentMap = BTreeMap<InstanceId, Option<RevisionHash>>;

/// One instance whose assignment must be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentChange {
    pub instance_id: InstanceId,
    pub from: Option<RevisionHash>,
    pub to: Option<RevisionHash>,
}

/// The outcome of planning one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentPlan {
    pub service: ServiceName,
    pub targets: BTreeMap<RevisionHash, usize>,
    pub next: AssignmentMap,
    /// Only the instances whose assignment differs from `current`.
    pub changes: Vec<AssignmentChange>,
}

impl AssignmentPlan {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    /// Instances per revision in `next`.
    pub fn counts(&self) -> BTreeMap<RevisionHash, usize> {
        let mut counts = BTreeMap::new();
        for revision in self.next.values().flatten() {
            *counts.entry(revision.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Plan the next assignment for every instance in `current`.
pub fn plan(service: &str, weights: &ServiceWeights, current: &AssignmentMap) -> AssignmentPlan {
    let targets = target_counts(weights, current.len());
    plan_with_targets(service, weights, targets, current)
}

/// Plan against precomputed targets.
///
/// Targets that no longer sum to the population (it changed after they
/// were computed) are tolerated: surplus instances fall through to the
/// lightest weighted revision.
pub fn plan_with_targets(
    service: &str,
    weights: &ServiceWeights,
    targets: BTreeMap<RevisionHash, usize>,
    current: &AssignmentMap,
) -> AssignmentPlan {
    let order = weights.by_descending_weight();

    let mut holders: BTreeMap<&str, Vec<&InstanceId>> = BTreeMap::new();
    let mut queue: BTreeSet<&InstanceId> = BTreeSet::new();
    for (instance, revision) in current {
        match revision {
            Some(rev) if weights.get(rev) > 0 => {
                holders.entry(rev.as_str()).or_default().push(instance);
            }
            _ => {
                queue.insert(instance);
            }
        }
    }

    let mut next = AssignmentMap::new();
    let mut filled: BTreeMap<&str, usize> = BTreeMap::new();
    for (revision, _) in &order {
        let target = targets.get(revision.as_str()).copied().unwrap_or(0);
        let current_holders = holders.remove(revision.as_str()).unwrap_or_default();
        let keep = current_holders.len().min(target);
        for instance in &current_holders[..keep] {
            next.insert((*instance).clone(), Some((*revision).clone()));
        }
        queue.extend(&current_holders[keep..]);
        filled.insert(revision.as_str(), keep);
    }

    for (revision, _) in &order {
        let target = targets.get(revision.as_str()).copied().unwrap_or(0);
        let mut have = filled.get(revision.as_str()).copied().unwrap_or(0);
        while have < target {
            let Some(instance) = queue.pop_first() else {
                break;
            };
            next.insert(instance.clone(), Some((*revision).clone()));
            have += 1;
        }
    }

    let fallback = weights.lightest();
    for instance in queue {
        next.insert(instance.clone(), fallback.cloned());
    }

    let changes = next
        .iter()
        .filter_map(|(instance, to)| {
            let from = current.get(instance).cloned().flatten();
            (from != *to).then(|| AssignmentChange {
                instance_id: instance.clone(),
                from,
                to: to.clone(),
            })
        })
        .collect();

    AssignmentPlan {
        service: service.to_string(),
        targets,
        next,
        changes,
    }
}
