//! Active system assembly.
//!
//! Selects the driving constraints that touch the target parameters and maps
//! the target parameters they reference onto Jacobian columns. Referenced
//! parameters outside the target set keep their value for the whole solve.

use crate::constraints::evaluator::{self, ParameterState};
use crate::constraints::{ConstraintKind, ConstraintRegistry, GeometricConstraint, InequalitySense, Relation};
use crate::error::EvalError;
use crate::ids::{ConstraintId, ParameterId};
use crate::parameters::{Bounds, ParameterRegistry};
use nalgebra::{DMatrix, DVector};
use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

#[derive(Debug)]
pub struct ActiveSystem<'c> {
    constraints: Vec<&'c GeometricConstraint>,
    /// First row and row count of each constraint
    rows: Vec<(usize, usize)>,
    row_count: usize,
    parameter_ids: Vec<ParameterId>,
    /// State slot of each column
    slots: Vec<usize>,
    column_of_slot: HashMap<usize, usize>,
    bounds: Vec<Bounds>,
    fd_step: f64,
}

impl<'c> ActiveSystem<'c> {
    pub fn build(
        parameters: &ParameterRegistry,
        constraints: &'c ConstraintRegistry,
        targets: Option<&HashSet<ParameterId>>,
        state: &ParameterState,
        fd_step: f64,
    ) -> Result<Self, EvalError> {
        let in_targets = |id: &ParameterId| targets.map_or(true, |t| t.contains(id));

        let mut active = Vec::new();
        let mut rows = Vec::new();
        let mut row_count = 0;
        let mut parameter_ids = Vec::new();
        let mut slots = Vec::new();
        let mut column_of_slot = HashMap::new();
        let mut bounds = Vec::new();

        for constraint in constraints.driving() {
            let referenced = constraint.referenced_parameters();
            if !referenced.iter().any(|id| in_targets(id)) {
                continue;
            }
            evaluator::check_supported(constraint)?;

            for id in referenced.into_iter().filter(|id| in_targets(id)) {
                let slot = state
                    .index_of(&id)
                    .ok_or_else(|| EvalError::UnknownParameter(id.clone()))?;
                if column_of_slot.contains_key(&slot) {
                    continue;
                }
                let parameter = parameters
                    .get(&id)
                    .ok_or_else(|| EvalError::UnknownParameter(id.clone()))?;
                column_of_slot.insert(slot, slots.len());
                slots.push(slot);
                bounds.push(parameter.base_bounds());
                parameter_ids.push(id);
            }

            let width = constraint.relation.equation_count();
            rows.push((row_count, width));
            row_count += width;
            active.push(constraint);
        }

        Ok(Self {
            constraints: active,
            rows,
            row_count,
            parameter_ids,
            slots,
            column_of_slot,
            bounds,
            fd_step,
        })
    }

    pub fn constraints(&self) -> &[&'c GeometricConstraint] {
        &self.constraints
    }

    pub fn is_active(&self, id: &ConstraintId) -> bool {
        self.constraints.iter().any(|c| &c.id == id)
    }

    pub fn parameter_ids(&self) -> &[ParameterId] {
        &self.parameter_ids
    }

    pub fn bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.slots.len()
    }

    pub fn residuals(&self, state: &ParameterState) -> Result<DVector<f64>, EvalError> {
        let mut r = DVector::zeros(self.row_count);
        for (constraint, &(start, width)) in self.constraints.iter().zip(&self.rows) {
            let rows = evaluator::residuals(constraint, state.view())?;
            for (k, value) in rows.into_iter().take(width).enumerate() {
                r[start + k] = value;
            }
        }
        Ok(r)
    }

    /// Dense Jacobian over the active columns. Entries for fixed parameters
    /// are dropped; duplicate entries are summed.
    pub fn jacobian(&self, state: &ParameterState) -> Result<DMatrix<f64>, EvalError> {
        let mut j = DMatrix::zeros(self.row_count, self.slots.len());
        for (constraint, &(start, width)) in self.constraints.iter().zip(&self.rows) {
            let rows = evaluator::jacobian(constraint, state.view(), self.fd_step)?;
            for (k, gradient) in rows.into_iter().take(width).enumerate() {
                for (slot, value) in gradient {
                    if let Some(&col) = self.column_of_slot.get(&slot) {
                        j[(start + k, col)] += value;
                    }
                }
            }
        }
        Ok(j)
    }

    /// Residual rows and Jacobian rows of a single active constraint.
    pub fn constraint_system(
        &self,
        index: usize,
        state: &ParameterState,
    ) -> Result<(Vec<f64>, Vec<Vec<(usize, f64)>>), EvalError> {
        let constraint = self.constraints[index];
        let residuals = evaluator::residuals(constraint, state.view())?;
        let gradients = evaluator::jacobian(constraint, state.view(), self.fd_step)?
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter_map(|(slot, g)| self.column_of_slot.get(&slot).map(|&col| (col, g)))
                    .collect()
            })
            .collect();
        Ok((residuals, gradients))
    }

    pub fn column_values(&self, state: &ParameterState) -> DVector<f64> {
        DVector::from_iterator(self.slots.len(), self.slots.iter().map(|&s| state.values()[s]))
    }

    /// Write column values back into the state, clamped to bounds.
    pub fn store(&self, values: &DVector<f64>, state: &mut ParameterState) {
        let out = state.values_mut();
        for (col, &slot) in self.slots.iter().enumerate() {
            out[slot] = self.bounds[col].clamp(values[col]);
        }
    }

    pub fn clamp_state(&self, state: &mut ParameterState) {
        let values = self.column_values(state);
        self.store(&values, state);
    }
}

/// Pairs of active constraints that act on the same quantity with targets no
/// value can satisfy together.
pub fn incompatible_pairs(constraints: &[&GeometricConstraint]) -> Vec<(ConstraintId, ConstraintId, String)> {
    let signatures: Vec<String> = constraints.iter().map(|c| c.relation.signature()).collect();
    let mut pairs = Vec::new();
    for i in 0..constraints.len() {
        for j in (i + 1)..constraints.len() {
            if signatures[i] != signatures[j] {
                continue;
            }
            if let Some(reason) = incompatibility(constraints[i], constraints[j]) {
                pairs.push((constraints[i].id.clone(), constraints[j].id.clone(), reason));
            }
        }
    }
    pairs
}

fn incompatibility(a: &GeometricConstraint, b: &GeometricConstraint) -> Option<String> {
    let slack = a.tolerance + b.tolerance;
    let (ta, tb) = (a.effective_target(), b.effective_target());

    match (a.kind, b.kind) {
        (ConstraintKind::Inequality(sa), ConstraintKind::Inequality(sb)) => {
            let (lo, hi) = match (sa, sb) {
                (InequalitySense::AtLeast, InequalitySense::AtMost) => (ta, tb),
                (InequalitySense::AtMost, InequalitySense::AtLeast) => (tb, ta),
                _ => return None,
            };
            (lo > hi + slack).then(|| format!("lower limit {} exceeds upper limit {}", lo, hi))
        }
        (ConstraintKind::Inequality(sense), _) => bound_violation(sense, ta, tb, slack),
        (_, ConstraintKind::Inequality(sense)) => bound_violation(sense, tb, ta, slack),
        _ => {
            let gap = match a.relation {
                Relation::Angle { .. } => wrap_difference(ta - tb),
                _ => ta - tb,
            };
            (gap.abs() > slack).then(|| format!("conflicting targets: {} vs {}", ta, tb))
        }
    }
}

fn bound_violation(sense: InequalitySense, limit: f64, value: f64, slack: f64) -> Option<String> {
    match sense {
        InequalitySense::AtLeast if value < limit - slack => {
            Some(format!("target {} is below the lower limit {}", value, limit))
        }
        InequalitySense::AtMost if value > limit + slack => {
            Some(format!("target {} is above the upper limit {}", value, limit))
        }
        _ => None,
    }
}

fn wrap_difference(mut delta: f64) -> f64 {
    delta %= 2.0 * PI;
    if delta > PI {
        delta -= 2.0 * PI;
    } else if delta <= -PI {
        delta += 2.0 * PI;
    }
    delta
}
