//! Constraint registry.
//!
//! Constraints are validated against the parameter registry before they are
//! stored, so everything the solver sees references known parameters and has
//! the target its relation requires.

pub mod evaluator;
pub mod types;

#[cfg(test)]
mod tests_registry;

pub use types::{
    CircleRef, Comparison, Condition, ConstraintKind, GeometricConstraint, InequalitySense, LineRef, PointRef,
    Priority, Relation, DEFAULT_TOLERANCE,
};

use crate::error::ValidationError;
use crate::ids::{ConstraintId, ParameterId};
use crate::parameters::ParameterRegistry;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ConstraintRegistry {
    constraints: HashMap<ConstraintId, GeometricConstraint>,
    order: Vec<ConstraintId>,
}

impl ConstraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(
        &self,
        constraint: &GeometricConstraint,
        parameters: &ParameterRegistry,
    ) -> Result<(), ValidationError> {
        if constraint.id.is_blank() {
            return Err(ValidationError::EmptyId { kind: "Constraint" });
        }
        if self.constraints.contains_key(&constraint.id) {
            return Err(ValidationError::DuplicateId {
                kind: "Constraint",
                id: constraint.id.to_string(),
            });
        }

        let referenced = constraint.referenced_parameters();
        if referenced.is_empty() {
            return Err(ValidationError::EmptyParameterSet(constraint.id.clone()));
        }
        if let Some(missing) = referenced.iter().find(|p| !parameters.contains(p)) {
            return Err(ValidationError::UnknownParameter {
                owner: constraint.id.to_string(),
                parameter: missing.clone(),
            });
        }

        constraint
            .relation
            .check_shape()
            .map_err(|reason| ValidationError::InvalidRelation {
                id: constraint.id.clone(),
                reason,
            })?;

        if let ConstraintKind::Inequality(_) = constraint.kind {
            if !constraint.relation.is_scalar_measure() {
                return Err(ValidationError::InvalidRelation {
                    id: constraint.id.clone(),
                    reason: format!("{} cannot be used as an inequality", constraint.relation.name()),
                });
            }
        }

        match constraint.target {
            None if constraint.relation.requires_target() => {
                return Err(ValidationError::MissingTarget(constraint.id.clone()));
            }
            Some(t) if !t.is_finite() => {
                return Err(ValidationError::InvalidRelation {
                    id: constraint.id.clone(),
                    reason: "target must be finite".to_string(),
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Validate and insert. A negative or NaN tolerance is clamped to zero.
    pub fn add(
        &mut self,
        mut constraint: GeometricConstraint,
        parameters: &ParameterRegistry,
    ) -> Result<(), ValidationError> {
        self.validate(&constraint, parameters)?;
        constraint.tolerance = sanitize_tolerance(constraint.tolerance);
        self.order.push(constraint.id.clone());
        self.constraints.insert(constraint.id.clone(), constraint);
        Ok(())
    }

    pub fn get(&self, id: &ConstraintId) -> Option<&GeometricConstraint> {
        self.constraints.get(id)
    }

    pub fn contains(&self, id: &ConstraintId) -> bool {
        self.constraints.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// All constraints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &GeometricConstraint> {
        self.order.iter().filter_map(|id| self.constraints.get(id))
    }

    /// Constraints the solver enforces.
    pub fn driving(&self) -> impl Iterator<Item = &GeometricConstraint> {
        self.iter().filter(|c| c.driving)
    }

    /// Position of the constraint in insertion order.
    pub fn position(&self, id: &ConstraintId) -> Option<usize> {
        self.order.iter().position(|other| other == id)
    }

    pub fn remove(&mut self, id: &ConstraintId) -> Option<GeometricConstraint> {
        let removed = self.constraints.remove(id)?;
        self.order.retain(|other| other != id);
        Some(removed)
    }

    /// Returns the previous driving flag.
    pub fn set_driving(&mut self, id: &ConstraintId, driving: bool) -> Option<bool> {
        let constraint = self.constraints.get_mut(id)?;
        Some(std::mem::replace(&mut constraint.driving, driving))
    }

    /// Returns the previous tolerance.
    pub fn set_tolerance(&mut self, id: &ConstraintId, tolerance: f64) -> Option<f64> {
        let constraint = self.constraints.get_mut(id)?;
        Some(std::mem::replace(&mut constraint.tolerance, sanitize_tolerance(tolerance)))
    }

    /// Constraints that read the parameter.
    pub fn users_of(&self, parameter: &ParameterId) -> Vec<&GeometricConstraint> {
        self.iter()
            .filter(|c| c.referenced_parameters().contains(parameter))
            .collect()
    }
}

fn sanitize_tolerance(tolerance: f64) -> f64 {
    if tolerance.is_nan() {
        0.0
    } else {
        tolerance.max(0.0)
    }
}
