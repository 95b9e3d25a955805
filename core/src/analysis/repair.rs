//! Auto-repair planning.
//!
//! One remedy per conflict: remove the weakest member of an over-constrained
//! set, relax the tolerance of an inconsistent pair (only when asked to), or
//! demote the weakest member of a cycle to a reference constraint. Planning is
//! pure; the resolver applies the resulting actions and emits events.

use super::conflicts::{ConflictType, ConstraintConflict};
use crate::constraints::{ConstraintRegistry, GeometricConstraint};
use crate::error::{ResolverError, ResolverResult};
use crate::ids::ConstraintId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairOptions {
    /// Apply suggested tolerances to inconsistent pairs instead of only reporting them
    pub apply_tolerance_relaxation: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepairAction {
    Remove(ConstraintId),
    Demote(ConstraintId),
    Relax { id: ConstraintId, tolerance: f64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    pub repaired: Vec<ConstraintConflict>,
    pub removed: Vec<ConstraintId>,
    pub modified: Vec<ConstraintId>,
    pub demoted: Vec<ConstraintId>,
    pub suggestions: Vec<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RepairPlan {
    pub actions: Vec<RepairAction>,
    pub report: RepairReport,
}

/// Plan repairs against the current registry.
///
/// `tombstones` holds ids removed by earlier repairs; conflicts naming them
/// count as already resolved. Any other unknown id is an error.
pub fn plan(
    conflicts: &[ConstraintConflict],
    constraints: &ConstraintRegistry,
    tombstones: &HashSet<ConstraintId>,
    options: RepairOptions,
) -> ResolverResult<RepairPlan> {
    for conflict in conflicts {
        if conflict.constraint_ids.is_empty() {
            return Err(ResolverError::InvalidRepair(format!(
                "{:?} conflict without constraints",
                conflict.conflict_type
            )));
        }
        for id in &conflict.constraint_ids {
            if !constraints.contains(id) && !tombstones.contains(id) {
                return Err(ResolverError::UnknownConstraint(id.clone()));
            }
        }
    }

    let mut plan = RepairPlan::default();
    let mut removed: HashSet<ConstraintId> = HashSet::new();
    let mut demoted: HashSet<ConstraintId> = HashSet::new();
    let mut unresolved = false;

    let position = |id: &ConstraintId| constraints.position(id).unwrap_or(usize::MAX);

    // Inconsistent pairs last: a member removed or demoted for another
    // conflict already breaks the pair.
    let ordered = conflicts
        .iter()
        .filter(|c| c.conflict_type != ConflictType::Inconsistent)
        .chain(conflicts.iter().filter(|c| c.conflict_type == ConflictType::Inconsistent));

    for conflict in ordered {
        if conflict
            .constraint_ids
            .iter()
            .any(|id| tombstones.contains(id) || removed.contains(id))
        {
            continue;
        }
        let members: Vec<&GeometricConstraint> = conflict
            .constraint_ids
            .iter()
            .filter_map(|id| constraints.get(id))
            .collect();

        match conflict.conflict_type {
            ConflictType::OverConstrained => {
                // Lowest priority, first added.
                let Some(victim) = members
                    .iter()
                    .filter(|c| c.driving && !demoted.contains(&c.id))
                    .min_by_key(|c| (c.priority, position(&c.id)))
                else {
                    continue;
                };
                removed.insert(victim.id.clone());
                plan.actions.push(RepairAction::Remove(victim.id.clone()));
                plan.report.removed.push(victim.id.clone());
                plan.report.repaired.push(conflict.clone());
            }
            ConflictType::CircularDependency => {
                if members.iter().any(|c| !c.driving || demoted.contains(&c.id)) {
                    continue;
                }
                // Lowest priority, last added.
                let Some(victim) = members
                    .iter()
                    .min_by_key(|c| (c.priority, std::cmp::Reverse(position(&c.id))))
                else {
                    continue;
                };
                demoted.insert(victim.id.clone());
                plan.actions.push(RepairAction::Demote(victim.id.clone()));
                plan.report.demoted.push(victim.id.clone());
                plan.report.repaired.push(conflict.clone());
            }
            ConflictType::Inconsistent => {
                if members.iter().any(|c| !c.driving || demoted.contains(&c.id)) {
                    continue;
                }
                let Some(tolerance) = conflict.suggested_tolerance.filter(|t| t.is_finite() && *t > 0.0) else {
                    plan.report
                        .suggestions
                        .push(format!("Review constraints {}", join(&conflict.constraint_ids)));
                    unresolved = true;
                    continue;
                };
                let pending: Vec<&&GeometricConstraint> =
                    members.iter().filter(|c| c.tolerance < tolerance).collect();
                if pending.is_empty() {
                    continue;
                }
                if options.apply_tolerance_relaxation {
                    for c in pending {
                        plan.actions.push(RepairAction::Relax {
                            id: c.id.clone(),
                            tolerance,
                        });
                        if !plan.report.modified.contains(&c.id) {
                            plan.report.modified.push(c.id.clone());
                        }
                    }
                    plan.report.repaired.push(conflict.clone());
                } else {
                    plan.report.suggestions.push(format!(
                        "Relax the tolerance of {} to {}",
                        join(&conflict.constraint_ids),
                        tolerance
                    ));
                    unresolved = true;
                }
            }
        }
    }

    plan.report.success = !unresolved;
    Ok(plan)
}

fn join(ids: &[ConstraintId]) -> String {
    ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(", ")
}
