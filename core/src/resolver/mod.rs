//! The resolver value callers construct and own.
//!
//! `ConstraintResolver` holds the three registries, the most recent solve
//! result and the observers. Every public operation goes through it. It is
//! `Send` but not shared; wrap it in a mutex if several tasks need it.

use crate::analysis::conflicts::{ConflictDetector, ConflictReport, ConstraintConflict};
use crate::analysis::health::{self, GraphAnalysis};
use crate::analysis::repair::{self, RepairAction, RepairOptions, RepairReport};
use crate::config::ResolverConfig;
use crate::constraints::{ConstraintRegistry, GeometricConstraint};
use crate::document::{ResolverDocument, DOCUMENT_VERSION};
use crate::entities::{EntityRegistry, GeometricEntity};
use crate::error::{ResolverError, ResolverResult};
use crate::events::{EventBus, ResolverEvent};
use crate::ids::{ConstraintId, EntityId, ParameterId};
use crate::parameters::{GeometricParameter, ParameterRegistry};
use crate::solver::{self, ConstraintSolutionResult, SolveProgress};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct ConstraintResolver {
    config: ResolverConfig,
    parameters: ParameterRegistry,
    entities: EntityRegistry,
    constraints: ConstraintRegistry,
    events: EventBus,
    last_result: Option<ConstraintSolutionResult>,
    /// Constraints removed by auto-repair, so replaying the same conflicts is a no-op.
    repaired_away: HashSet<ConstraintId>,
}

impl ConstraintResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    // --- Registration ---

    pub fn add_parameter(&mut self, parameter: GeometricParameter) -> ResolverResult<()> {
        let id = parameter.id.clone();
        self.parameters.add(parameter)?;
        debug!("Added parameter '{}'", id);
        self.events.emit(ResolverEvent::ParameterCreated { id });
        Ok(())
    }

    pub fn add_entity(&mut self, entity: GeometricEntity) -> ResolverResult<()> {
        let id = entity.id.clone();
        self.entities.add(entity, &self.parameters)?;
        debug!("Added entity '{}'", id);
        self.events.emit(ResolverEvent::EntityCreated { id });
        Ok(())
    }

    pub fn add_constraint(&mut self, constraint: GeometricConstraint) -> ResolverResult<()> {
        let id = constraint.id.clone();
        self.constraints.add(constraint, &self.parameters)?;
        self.repaired_away.remove(&id);
        debug!("Added constraint '{}'", id);
        self.events.emit(ResolverEvent::ConstraintCreated { id });
        Ok(())
    }

    // --- Lookup ---

    pub fn parameter(&self, id: &ParameterId) -> Option<&GeometricParameter> {
        self.parameters.get(id)
    }

    pub fn entity(&self, id: &EntityId) -> Option<&GeometricEntity> {
        self.entities.get(id)
    }

    pub fn constraint(&self, id: &ConstraintId) -> Option<&GeometricConstraint> {
        self.constraints.get(id)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &GeometricParameter> {
        self.parameters.iter()
    }

    pub fn entities(&self) -> impl Iterator<Item = &GeometricEntity> {
        self.entities.iter()
    }

    pub fn constraints(&self) -> impl Iterator<Item = &GeometricConstraint> {
        self.constraints.iter()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    // --- Removal and edits ---

    /// Fails while a constraint references the parameter or an entity lists it.
    pub fn remove_parameter(&mut self, id: &ParameterId) -> ResolverResult<GeometricParameter> {
        if !self.parameters.contains(id) {
            return Err(ResolverError::UnknownParameter(id.clone()));
        }
        let users: Vec<String> = self
            .constraints
            .users_of(id)
            .into_iter()
            .map(|c| format!("constraint '{}'", c.id))
            .chain(self.entities.owners_of(id).into_iter().map(|e| format!("entity '{}'", e.id)))
            .collect();
        if !users.is_empty() {
            return Err(ResolverError::ParameterInUse {
                parameter: id.clone(),
                users: users.join(", "),
            });
        }

        let removed = self
            .parameters
            .remove(id)
            .ok_or_else(|| ResolverError::UnknownParameter(id.clone()))?;
        self.events.emit(ResolverEvent::ParameterRemoved { id: id.clone() });
        Ok(removed)
    }

    pub fn remove_entity(&mut self, id: &EntityId) -> ResolverResult<GeometricEntity> {
        let removed = self
            .entities
            .remove(id)
            .ok_or_else(|| ResolverError::UnknownEntity(id.clone()))?;
        self.events.emit(ResolverEvent::EntityRemoved { id: id.clone() });
        Ok(removed)
    }

    pub fn remove_constraint(&mut self, id: &ConstraintId) -> ResolverResult<GeometricConstraint> {
        let removed = self
            .constraints
            .remove(id)
            .ok_or_else(|| ResolverError::UnknownConstraint(id.clone()))?;
        self.events.emit(ResolverEvent::ConstraintRemoved { id: id.clone() });
        Ok(removed)
    }

    /// Switch a constraint between driving and reference. No event when unchanged.
    pub fn set_driving(&mut self, id: &ConstraintId, driving: bool) -> ResolverResult<()> {
        let previous = self
            .constraints
            .set_driving(id, driving)
            .ok_or_else(|| ResolverError::UnknownConstraint(id.clone()))?;
        if previous != driving {
            self.events.emit(ResolverEvent::ConstraintDrivingChanged {
                id: id.clone(),
                driving,
            });
        }
        Ok(())
    }

    /// Negative tolerances are clamped to zero.
    pub fn set_tolerance(&mut self, id: &ConstraintId, tolerance: f64) -> ResolverResult<()> {
        self.constraints
            .set_tolerance(id, tolerance)
            .ok_or_else(|| ResolverError::UnknownConstraint(id.clone()))?;
        self.events.emit(ResolverEvent::ConstraintModified { id: id.clone() });
        Ok(())
    }

    // --- Solving ---

    /// Solve for `targets` (all referenced parameters when `None`).
    ///
    /// Non-convergence is reported through the result status, never as an error.
    pub fn solve(&mut self, targets: Option<&HashSet<ParameterId>>) -> ResolverResult<ConstraintSolutionResult> {
        self.run_solve(targets, None)
    }

    pub fn solve_with_progress(
        &mut self,
        targets: Option<&HashSet<ParameterId>>,
        progress: &mut dyn FnMut(&SolveProgress),
    ) -> ResolverResult<ConstraintSolutionResult> {
        self.run_solve(targets, Some(progress))
    }

    fn run_solve(
        &mut self,
        targets: Option<&HashSet<ParameterId>>,
        progress: Option<&mut dyn FnMut(&SolveProgress)>,
    ) -> ResolverResult<ConstraintSolutionResult> {
        let mut result = solver::solve(&self.parameters, &self.constraints, targets, &self.config.solver, progress)?;

        if !result.status.is_success() {
            let report = self.detector().detect(Some(&result));
            if let Some(recommendations) = result.recommendations.as_mut() {
                for conflict in &report.conflicts {
                    for id in &conflict.constraint_ids {
                        if !recommendations.conflicting_constraints.contains(id) {
                            recommendations.conflicting_constraints.push(id.clone());
                        }
                    }
                }
            }
            warn!(
                "Solve {} ended {} with {} conflict(s)",
                result.solve_id,
                result.status,
                report.conflicts.len()
            );
        }

        self.last_result = Some(result.clone());
        Ok(result)
    }

    /// Write solved values back into the parameter registry.
    ///
    /// All ids are checked before anything is written. Returns the number of
    /// parameters updated.
    pub fn apply_solved_values(&mut self, result: &ConstraintSolutionResult) -> ResolverResult<usize> {
        if let Some(missing) = result.values.keys().find(|id| !self.parameters.contains(id)) {
            return Err(ResolverError::UnknownParameter(missing.clone()));
        }

        for (id, value) in &result.values {
            if let Some(parameter) = self.parameters.get_mut(id) {
                parameter.value = parameter.bounds.clamp(*value);
            }
        }

        let count = result.values.len();
        info!("Applied {} solved value(s) from solve {}", count, result.solve_id);
        self.events.emit(ResolverEvent::ValuesApplied {
            solve_id: result.solve_id,
            count,
        });
        Ok(count)
    }

    pub fn last_result(&self) -> Option<&ConstraintSolutionResult> {
        self.last_result.as_ref()
    }

    // --- Analysis ---

    fn detector(&self) -> ConflictDetector<'_> {
        ConflictDetector::new(&self.parameters, &self.entities, &self.constraints, &self.config.analysis)
    }

    /// Structural conflicts, plus unsatisfied pairs from the last solve if there was one.
    pub fn detect_constraint_conflicts(&self) -> ConflictReport {
        self.detector().detect(self.last_result.as_ref())
    }

    pub fn auto_repair_constraints(&mut self, conflicts: &[ConstraintConflict]) -> ResolverResult<RepairReport> {
        self.auto_repair_constraints_with(conflicts, RepairOptions::default())
    }

    /// Plan and apply one remedy per conflict. Nothing is changed if planning fails.
    pub fn auto_repair_constraints_with(
        &mut self,
        conflicts: &[ConstraintConflict],
        options: RepairOptions,
    ) -> ResolverResult<RepairReport> {
        let plan = repair::plan(conflicts, &self.constraints, &self.repaired_away, options)?;

        for action in &plan.actions {
            match action {
                RepairAction::Remove(id) => {
                    self.remove_constraint(id)?;
                    self.repaired_away.insert(id.clone());
                    info!("Repair removed constraint '{}'", id);
                }
                RepairAction::Demote(id) => {
                    self.set_driving(id, false)?;
                    info!("Repair demoted constraint '{}' to reference", id);
                }
                RepairAction::Relax { id, tolerance } => {
                    self.set_tolerance(id, *tolerance)?;
                    info!("Repair relaxed tolerance of '{}' to {}", id, tolerance);
                }
            }
        }

        Ok(plan.report)
    }

    pub fn analyze_relation_graph(&self) -> GraphAnalysis {
        let conflicts = self.detector().detect(self.last_result.as_ref());
        health::analyze(
            &self.parameters,
            &self.entities,
            &self.constraints,
            &conflicts,
            &self.config.analysis,
        )
    }

    // --- Observers ---

    pub fn subscribe(&mut self, observer: impl FnMut(&ResolverEvent) + Send + 'static) {
        self.events.subscribe(Box::new(observer));
    }

    // --- Interchange ---

    pub fn to_document(&self) -> ResolverDocument {
        ResolverDocument {
            version: DOCUMENT_VERSION,
            parameters: self.parameters.iter().cloned().collect(),
            entities: self.entities.iter().cloned().collect(),
            constraints: self.constraints.iter().cloned().collect(),
            last_result: self.last_result.clone(),
        }
    }

    /// Rebuild a resolver, re-validating every item. No events are emitted.
    pub fn from_document(document: ResolverDocument, config: ResolverConfig) -> ResolverResult<Self> {
        let mut resolver = Self::new(config);

        for parameter in document.parameters {
            resolver.parameters.add(parameter)?;
        }

        // Links may point forward in the list, so insert bare entities first.
        let mut links = Vec::new();
        for mut entity in document.entities {
            if let Some(parent) = entity.parent.take() {
                links.push((parent, entity.id.clone()));
            }
            for child in std::mem::take(&mut entity.children) {
                links.push((entity.id.clone(), child));
            }
            resolver.entities.add(entity, &resolver.parameters)?;
        }
        for (parent, child) in &links {
            resolver.entities.link(parent, child)?;
        }

        for constraint in document.constraints {
            resolver.constraints.add(constraint, &resolver.parameters)?;
        }

        resolver.last_result = document.last_result;
        Ok(resolver)
    }

    pub fn to_json(&self) -> ResolverResult<String> {
        Ok(self.to_document().to_json()?)
    }

    pub fn from_json(json: &str, config: ResolverConfig) -> ResolverResult<Self> {
        Self::from_document(ResolverDocument::from_json(json)?, config)
    }
}

#[cfg(test)]
mod tests_resolver;
