//! Conflict detection.
//!
//! Three independent checks over the driving constraints:
//! over-constrained subgraphs (plus exact duplicates), inconsistent pairs,
//! and circular dependencies in the [`DependencyGraph`].

use super::graph::{DependencyGraph, NodeId};
use crate::config::AnalysisConfig;
use crate::constraints::{ConstraintRegistry, GeometricConstraint};
use crate::entities::EntityRegistry;
use crate::ids::{ConstraintId, EntityId};
use crate::parameters::ParameterRegistry;
use crate::solver::{incompatible_pairs, ConstraintSolutionResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    OverConstrained,
    Inconsistent,
    CircularDependency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintConflict {
    pub conflict_type: ConflictType,
    pub constraint_ids: Vec<ConstraintId>,
    #[serde(default)]
    pub entity_ids: Vec<EntityId>,
    pub severity: Severity,
    pub suggestion: String,
    /// Tolerance that would let an inconsistent pair hold together
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_tolerance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub total: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflicts: Vec<ConstraintConflict>,
    pub summary: ConflictSummary,
}

impl ConflictReport {
    pub fn new(conflicts: Vec<ConstraintConflict>) -> Self {
        let mut summary = ConflictSummary {
            total: conflicts.len(),
            ..Default::default()
        };
        for conflict in &conflicts {
            match conflict.severity {
                Severity::Low => summary.low += 1,
                Severity::Medium => summary.medium += 1,
                Severity::High => summary.high += 1,
                Severity::Critical => summary.critical += 1,
            }
        }
        Self { conflicts, summary }
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn of_type(&self, conflict_type: ConflictType) -> Vec<&ConstraintConflict> {
        self.conflicts
            .iter()
            .filter(|c| c.conflict_type == conflict_type)
            .collect()
    }
}

pub struct ConflictDetector<'a> {
    parameters: &'a ParameterRegistry,
    entities: &'a EntityRegistry,
    constraints: &'a ConstraintRegistry,
    config: &'a AnalysisConfig,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(
        parameters: &'a ParameterRegistry,
        entities: &'a EntityRegistry,
        constraints: &'a ConstraintRegistry,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            parameters,
            entities,
            constraints,
            config,
        }
    }

    /// Run every check. `last_result` feeds the numeric inconsistency check.
    pub fn detect(&self, last_result: Option<&ConstraintSolutionResult>) -> ConflictReport {
        let graph = DependencyGraph::build(self.parameters, self.entities, self.constraints);

        let mut conflicts = self.over_constrained(&graph);
        conflicts.extend(self.inconsistent(last_result));
        conflicts.extend(self.circular(&graph));

        let report = ConflictReport::new(conflicts);
        if report.is_empty() {
            debug!("No constraint conflicts detected");
        } else {
            info!(
                "Detected {} constraint conflicts ({} critical, {} high)",
                report.summary.total, report.summary.critical, report.summary.high
            );
        }
        report
    }

    fn entities_of(&self, constraints: &[&GeometricConstraint]) -> Vec<EntityId> {
        let ownership = self.entities.ownership();
        let mut out: Vec<EntityId> = Vec::new();
        for constraint in constraints {
            for parameter in constraint.referenced_parameters() {
                if let Some(owner) = ownership.get(&parameter) {
                    if !out.contains(owner) {
                        out.push(owner.clone());
                    }
                }
            }
        }
        out
    }

    fn lookup(&self, ids: &[ConstraintId]) -> Vec<&'a GeometricConstraint> {
        ids.iter().filter_map(|id| self.constraints.get(id)).collect()
    }

    /// Lowest priority first; ties keep insertion order.
    fn by_priority(&self, mut constraints: Vec<&'a GeometricConstraint>) -> Vec<&'a GeometricConstraint> {
        constraints.sort_by_key(|c| (c.priority, self.constraints.position(&c.id).unwrap_or(usize::MAX)));
        constraints
    }

    fn over_constrained(&self, graph: &DependencyGraph) -> Vec<ConstraintConflict> {
        let mut conflicts = Vec::new();
        let driving: Vec<&GeometricConstraint> = self.constraints.driving().collect();

        // Exact duplicates: same relation and kind, targets within tolerance.
        let mut duplicates: HashSet<&ConstraintId> = HashSet::new();
        for i in 0..driving.len() {
            for j in (i + 1)..driving.len() {
                let (a, b) = (driving[i], driving[j]);
                if duplicates.contains(&b.id) || a.kind != b.kind {
                    continue;
                }
                if a.relation.signature() != b.relation.signature() {
                    continue;
                }
                if (a.effective_target() - b.effective_target()).abs() <= a.tolerance + b.tolerance {
                    duplicates.insert(&b.id);
                    conflicts.push(ConstraintConflict {
                        conflict_type: ConflictType::OverConstrained,
                        constraint_ids: vec![a.id.clone(), b.id.clone()],
                        entity_ids: self.entities_of(&[a, b]),
                        severity: Severity::Low,
                        suggestion: format!("Constraint '{}' duplicates '{}'; remove one of them", b.id, a.id),
                        suggested_tolerance: None,
                    });
                }
            }
        }

        for component in graph.components() {
            if component.equations <= component.degrees_of_freedom {
                continue;
            }
            let excess = component.equations - component.degrees_of_freedom;
            let members = self.lookup(&component.constraints);
            let candidates: Vec<String> = self
                .by_priority(members.clone())
                .iter()
                .take(excess)
                .map(|c| c.id.to_string())
                .collect();
            let entity_ids = component
                .nodes
                .iter()
                .filter_map(|n| match n {
                    NodeId::Entity(e) => Some(e.clone()),
                    NodeId::Parameter(_) => None,
                })
                .collect();

            conflicts.push(ConstraintConflict {
                conflict_type: ConflictType::OverConstrained,
                constraint_ids: component.constraints.clone(),
                entity_ids,
                severity: Severity::High,
                suggestion: format!(
                    "{} equations drive {} degrees of freedom; consider removing {}",
                    component.equations,
                    component.degrees_of_freedom,
                    candidates.join(", ")
                ),
                suggested_tolerance: None,
            });
        }
        conflicts
    }

    fn inconsistent(&self, last_result: Option<&ConstraintSolutionResult>) -> Vec<ConstraintConflict> {
        let driving: Vec<&GeometricConstraint> = self.constraints.driving().collect();
        let mut conflicts = Vec::new();
        let mut reported: HashSet<(ConstraintId, ConstraintId)> = HashSet::new();

        for (a, b, reason) in incompatible_pairs(&driving) {
            let (Some(ca), Some(cb)) = (self.constraints.get(&a), self.constraints.get(&b)) else {
                continue;
            };
            let gap = (ca.effective_target() - cb.effective_target()).abs();
            conflicts.push(ConstraintConflict {
                conflict_type: ConflictType::Inconsistent,
                constraint_ids: vec![a.clone(), b.clone()],
                entity_ids: self.entities_of(&[ca, cb]),
                severity: Severity::Critical,
                suggestion: format!("Constraints '{}' and '{}' cannot both hold ({})", a, b, reason),
                suggested_tolerance: Some(gap / 2.0),
            });
            reported.insert((a.clone(), b.clone()));
            reported.insert((b, a));
        }

        // Numeric check: both left unsatisfied by the last solve while sharing parameters.
        let Some(result) = last_result else {
            return conflicts;
        };
        let unsatisfied: Vec<&GeometricConstraint> = driving
            .iter()
            .copied()
            .filter(|c| result.satisfaction(&c.id).is_some_and(|s| s.active && !s.satisfied))
            .collect();
        for i in 0..unsatisfied.len() {
            for j in (i + 1)..unsatisfied.len() {
                let (a, b) = (unsatisfied[i], unsatisfied[j]);
                if reported.contains(&(a.id.clone(), b.id.clone())) {
                    continue;
                }
                let shared: Vec<_> = {
                    let pa = a.referenced_parameters();
                    b.referenced_parameters().into_iter().filter(|p| pa.contains(p)).collect()
                };
                if shared.is_empty() {
                    continue;
                }
                let worst = [a, b]
                    .iter()
                    .filter_map(|c| result.satisfaction(&c.id))
                    .fold(0.0_f64, |acc, s| acc.max(s.error));
                conflicts.push(ConstraintConflict {
                    conflict_type: ConflictType::Inconsistent,
                    constraint_ids: vec![a.id.clone(), b.id.clone()],
                    entity_ids: self.entities_of(&[a, b]),
                    severity: Severity::Medium,
                    suggestion: format!(
                        "Constraints '{}' and '{}' both stay unsatisfied on {} shared parameter(s); relax their tolerance",
                        a.id,
                        b.id,
                        shared.len()
                    ),
                    suggested_tolerance: Some(worst),
                });
            }
        }
        conflicts
    }

    fn circular(&self, graph: &DependencyGraph) -> Vec<ConstraintConflict> {
        graph
            .cycles()
            .into_iter()
            .filter(|cycle| cycle.constraints.len() >= self.config.min_cycle_length)
            .map(|cycle| {
                let entity_ids = cycle
                    .nodes
                    .iter()
                    .filter_map(|n| match n {
                        NodeId::Entity(e) => Some(e.clone()),
                        NodeId::Parameter(_) => None,
                    })
                    .collect();
                let weakest = self
                    .by_priority(self.lookup(&cycle.constraints))
                    .first()
                    .map(|c| c.id.to_string())
                    .unwrap_or_default();
                ConstraintConflict {
                    conflict_type: ConflictType::CircularDependency,
                    suggestion: format!(
                        "Driving constraints form a cycle of length {}; make '{}' a reference constraint",
                        cycle.constraints.len(),
                        weakest
                    ),
                    constraint_ids: cycle.constraints,
                    entity_ids,
                    severity: Severity::High,
                    suggested_tolerance: None,
                }
            })
            .collect()
    }
}
