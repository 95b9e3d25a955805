//! Parameter registry.
//!
//! Named scalar values (lengths, angles, coordinates, radii, ratios) that
//! constraints relate to each other. The registry owns the parameter
//! lifetime; entities and constraints only reference parameters by id.

pub mod types;


pub use types::{Bounds, GeometricParameter, ParameterType};

use crate::error::ValidationError;
use crate::ids::ParameterId;
use std::collections::HashMap;
use tracing::warn;

/// Keyed store of all parameters, with insertion order preserved.
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    parameters: HashMap<ParameterId, GeometricParameter>,
    order: Vec<ParameterId>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check structural rules without touching the registry.
    pub fn validate(&self, parameter: &GeometricParameter) -> Result<(), ValidationError> {
        if parameter.id.is_blank() {
            return Err(ValidationError::EmptyId { kind: "Parameter" });
        }
        if self.parameters.contains_key(&parameter.id) {
            return Err(ValidationError::DuplicateId {
                kind: "Parameter",
                id: parameter.id.to_string(),
            });
        }
        if !parameter.value.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                id: parameter.id.clone(),
                field: "value",
            });
        }
        if parameter.bounds.min.is_nan() || parameter.bounds.max.is_nan() {
            return Err(ValidationError::NonFiniteValue {
                id: parameter.id.clone(),
                field: "bound",
            });
        }
        if parameter.bounds.min >= parameter.bounds.max {
            return Err(ValidationError::InvalidBounds {
                id: parameter.id.clone(),
                min: parameter.bounds.min,
                max: parameter.bounds.max,
            });
        }
        Ok(())
    }

    /// Validate and insert. A value outside its bounds is accepted with a warning;
    /// the solver clamps it.
    pub fn add(&mut self, parameter: GeometricParameter) -> Result<(), ValidationError> {
        self.validate(&parameter)?;

        if !parameter.bounds.contains(parameter.value) {
            warn!(
                "Parameter '{}' value {} lies outside [{}, {}]",
                parameter.id, parameter.value, parameter.bounds.min, parameter.bounds.max
            );
        }

        self.order.push(parameter.id.clone());
        self.parameters.insert(parameter.id.clone(), parameter);
        Ok(())
    }

    pub fn get(&self, id: &ParameterId) -> Option<&GeometricParameter> {
        self.parameters.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &ParameterId) -> Option<&mut GeometricParameter> {
        self.parameters.get_mut(id)
    }

    pub fn contains(&self, id: &ParameterId) -> bool {
        self.parameters.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// All parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &GeometricParameter> {
        self.order.iter().filter_map(|id| self.parameters.get(id))
    }

    pub fn ids(&self) -> &[ParameterId] {
        &self.order
    }

    pub fn remove(&mut self, id: &ParameterId) -> Option<GeometricParameter> {
        let removed = self.parameters.remove(id)?;
        self.order.retain(|other| other != id);
        Some(removed)
    }

    /// Parameters whose current value violates their bounds.
    pub fn out_of_bounds(&self) -> Vec<&GeometricParameter> {
        self.iter().filter(|p| !p.bounds.contains(p.value)).collect()
    }
}
