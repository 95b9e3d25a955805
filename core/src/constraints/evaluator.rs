//! Residual and Jacobian contributions per relation kind.
//!
//! Every relation has a real analytic residual. Derivatives are closed form
//! where they stay short (distance, angle, parallel, perpendicular, concentric,
//! pattern, value, difference) and central finite differences otherwise
//! (tangent, symmetric). Gradients are sparse rows over the indices of a
//! [`ParameterState`]; the same parameter may appear more than once in a row
//! and callers must sum duplicates.

use super::types::{ConstraintKind, GeometricConstraint, InequalitySense, LineRef, PointRef, Relation};
use crate::error::EvalError;
use crate::ids::ParameterId;
use crate::parameters::ParameterRegistry;
use std::collections::HashMap;
use std::f64::consts::PI;

/// Squared lengths below this are treated as degenerate.
const DEGENERATE_LENGTH_SQ: f64 = 1e-24;

/// Sparse gradient of one residual row.
pub type GradientRow = Vec<(usize, f64)>;

/// Dense vector of parameter values (base units) addressed by id.
#[derive(Debug, Clone, Default)]
pub struct ParameterState {
    ids: Vec<ParameterId>,
    index: HashMap<ParameterId, usize>,
    values: Vec<f64>,
}

impl ParameterState {
    pub fn new(entries: impl IntoIterator<Item = (ParameterId, f64)>) -> Self {
        let mut state = Self::default();
        for (id, value) in entries {
            state.index.insert(id.clone(), state.ids.len());
            state.ids.push(id);
            state.values.push(value);
        }
        state
    }

    /// Snapshot every registered parameter in base units.
    pub fn from_registry(parameters: &ParameterRegistry) -> Self {
        Self::new(parameters.iter().map(|p| (p.id.clone(), p.base_value())))
    }

    pub fn view(&self) -> StateView<'_> {
        StateView {
            index: &self.index,
            values: &self.values,
        }
    }

    pub fn index_of(&self, id: &ParameterId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn ids(&self) -> &[ParameterId] {
        &self.ids
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn get(&self, id: &ParameterId) -> Option<f64> {
        self.index_of(id).map(|i| self.values[i])
    }

    pub fn set(&mut self, id: &ParameterId, value: f64) -> bool {
        match self.index_of(id) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }
}

/// Borrowed view used during evaluation, so finite differences can swap in a
/// perturbed value vector without cloning the index.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    index: &'a HashMap<ParameterId, usize>,
    values: &'a [f64],
}

impl<'a> StateView<'a> {
    fn with_values<'b>(&self, values: &'b [f64]) -> StateView<'b>
    where
        'a: 'b,
    {
        StateView { index: self.index, values }
    }

    fn slot(&self, id: &ParameterId) -> Result<usize, EvalError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| EvalError::UnknownParameter(id.clone()))
    }

    fn value(&self, id: &ParameterId) -> Result<f64, EvalError> {
        Ok(self.values[self.slot(id)?])
    }

    fn point(&self, p: &PointRef) -> Result<[f64; 2], EvalError> {
        Ok([self.value(&p.x)?, self.value(&p.y)?])
    }

    fn direction(&self, l: &LineRef) -> Result<[f64; 2], EvalError> {
        let s = self.point(&l.start)?;
        let e = self.point(&l.end)?;
        Ok([e[0] - s[0], e[1] - s[1]])
    }
}

/// Reject relation/kind combinations the evaluator has no residual for.
pub fn check_supported(constraint: &GeometricConstraint) -> Result<(), EvalError> {
    if let ConstraintKind::Inequality(_) = constraint.kind {
        if !constraint.relation.is_scalar_measure() {
            return Err(EvalError::Unsupported {
                relation: constraint.relation.name(),
                context: "an inequality",
            });
        }
    }
    Ok(())
}

/// Residual rows of a constraint at the given state.
pub fn residuals(constraint: &GeometricConstraint, state: StateView<'_>) -> Result<Vec<f64>, EvalError> {
    check_supported(constraint)?;
    let mut rows = relation_residuals(&constraint.relation, constraint.effective_target(), state)?;
    if let ConstraintKind::Inequality(sense) = constraint.kind {
        for r in rows.iter_mut() {
            *r = clip_inequality(sense, *r);
        }
    }
    Ok(rows)
}

/// Jacobian rows of a constraint at the given state.
pub fn jacobian(
    constraint: &GeometricConstraint,
    state: StateView<'_>,
    fd_step: f64,
) -> Result<Vec<GradientRow>, EvalError> {
    check_supported(constraint)?;
    let target = constraint.effective_target();
    let mut rows = relation_gradients(&constraint.relation, target, state, fd_step)?;
    if let ConstraintKind::Inequality(sense) = constraint.kind {
        let raw = relation_residuals(&constraint.relation, target, state)?;
        for (row, r) in rows.iter_mut().zip(raw) {
            if clip_inequality(sense, r) == 0.0 {
                row.clear();
            }
        }
    }
    Ok(rows)
}

/// Largest absolute residual of the constraint.
pub fn error(constraint: &GeometricConstraint, state: StateView<'_>) -> Result<f64, EvalError> {
    Ok(residuals(constraint, state)?
        .iter()
        .fold(0.0_f64, |acc, r| acc.max(r.abs())))
}

fn clip_inequality(sense: InequalitySense, r: f64) -> f64 {
    match sense {
        InequalitySense::AtLeast => r.min(0.0),
        InequalitySense::AtMost => r.max(0.0),
    }
}

/// Wrap an angle into (-pi, pi].
fn wrap_angle(mut angle: f64) -> f64 {
    angle %= 2.0 * PI;
    if angle > PI {
        angle -= 2.0 * PI;
    } else if angle <= -PI {
        angle += 2.0 * PI;
    }
    angle
}

fn line_angle(d: [f64; 2]) -> f64 {
    d[1].atan2(d[0])
}

fn relation_residuals(relation: &Relation, target: f64, state: StateView<'_>) -> Result<Vec<f64>, EvalError> {
    match relation {
        Relation::Distance { a, b } => {
            let pa = state.point(a)?;
            let pb = state.point(b)?;
            Ok(vec![(pb[0] - pa[0]).hypot(pb[1] - pa[1]) - target])
        }
        Relation::Angle { a, b } => {
            let ta = line_angle(state.direction(a)?);
            let tb = line_angle(state.direction(b)?);
            Ok(vec![wrap_angle(tb - ta - target)])
        }
        Relation::Parallel { a, b } => {
            let ta = line_angle(state.direction(a)?);
            let tb = line_angle(state.direction(b)?);
            Ok(vec![(tb - ta).sin()])
        }
        Relation::Perpendicular { a, b } => {
            let ta = line_angle(state.direction(a)?);
            let tb = line_angle(state.direction(b)?);
            Ok(vec![(tb - ta).cos()])
        }
        Relation::Tangent { line, circle } => {
            let s = state.point(&line.start)?;
            let d = state.direction(line)?;
            let c = state.point(&circle.center)?;
            let radius = state.value(&circle.radius)?;
            let len_sq = d[0] * d[0] + d[1] * d[1];
            let to_center = [c[0] - s[0], c[1] - s[1]];
            let distance = if len_sq < DEGENERATE_LENGTH_SQ {
                to_center[0].hypot(to_center[1])
            } else {
                (d[0] * to_center[1] - d[1] * to_center[0]).abs() / len_sq.sqrt()
            };
            Ok(vec![distance - radius])
        }
        Relation::Concentric { a, b } => {
            let pa = state.point(a)?;
            let pb = state.point(b)?;
            Ok(vec![pb[0] - pa[0], pb[1] - pa[1]])
        }
        Relation::Symmetric { a, b, axis } => {
            let pa = state.point(a)?;
            let pb = state.point(b)?;
            let s = state.point(&axis.start)?;
            let d = state.direction(axis)?;
            let len = d[0].hypot(d[1]);
            let u = if len * len < DEGENERATE_LENGTH_SQ { [1.0, 0.0] } else { [d[0] / len, d[1] / len] };
            let mid = [(pa[0] + pb[0]) * 0.5 - s[0], (pa[1] + pb[1]) * 0.5 - s[1]];
            let span = [pb[0] - pa[0], pb[1] - pa[1]];
            Ok(vec![
                u[0] * mid[1] - u[1] * mid[0],
                span[0] * u[0] + span[1] * u[1],
            ])
        }
        Relation::Conditional { condition, then, otherwise } => {
            let width = relation.equation_count();
            let active = if condition.holds(state.value(&condition.parameter)?) {
                Some(then.as_ref())
            } else {
                otherwise.as_deref()
            };
            let mut rows = match active {
                Some(branch) => relation_residuals(branch, target, state)?,
                None => Vec::new(),
            };
            rows.resize(width, 0.0);
            Ok(rows)
        }
        Relation::Pattern { reference, instances, direction } => {
            if instances.is_empty() {
                return Err(EvalError::Unsupported {
                    relation: "pattern",
                    context: "a pattern without instances",
                });
            }
            let step = [target * direction.cos(), target * direction.sin()];
            let mut rows = Vec::with_capacity(2 * instances.len());
            let mut previous = state.point(reference)?;
            for instance in instances {
                let current = state.point(instance)?;
                rows.push(current[0] - previous[0] - step[0]);
                rows.push(current[1] - previous[1] - step[1]);
                previous = current;
            }
            Ok(rows)
        }
        Relation::Value { parameter } => Ok(vec![state.value(parameter)? - target]),
        Relation::Difference { a, b } => Ok(vec![state.value(a)? - state.value(b)? - target]),
    }
}

/// Gradient of a line's direction angle with respect to its four coordinates.
fn angle_gradient(line: &LineRef, state: StateView<'_>) -> Result<GradientRow, EvalError> {
    let d = state.direction(line)?;
    let len_sq = d[0] * d[0] + d[1] * d[1];
    if len_sq < DEGENERATE_LENGTH_SQ {
        return Ok(Vec::new());
    }
    Ok(vec![
        (state.slot(&line.start.x)?, d[1] / len_sq),
        (state.slot(&line.start.y)?, -d[0] / len_sq),
        (state.slot(&line.end.x)?, -d[1] / len_sq),
        (state.slot(&line.end.y)?, d[0] / len_sq),
    ])
}

/// `scale * (grad(theta_b) - grad(theta_a))`
fn relative_angle_gradient(a: &LineRef, b: &LineRef, scale: f64, state: StateView<'_>) -> Result<GradientRow, EvalError> {
    let mut row: GradientRow = angle_gradient(b, state)?
        .into_iter()
        .map(|(i, g)| (i, scale * g))
        .collect();
    row.extend(angle_gradient(a, state)?.into_iter().map(|(i, g)| (i, -scale * g)));
    Ok(row)
}

fn relation_gradients(
    relation: &Relation,
    target: f64,
    state: StateView<'_>,
    fd_step: f64,
) -> Result<Vec<GradientRow>, EvalError> {
    match relation {
        Relation::Distance { a, b } => {
            let pa = state.point(a)?;
            let pb = state.point(b)?;
            let delta = [pb[0] - pa[0], pb[1] - pa[1]];
            let len = delta[0].hypot(delta[1]);
            // Coincident points: push apart along +x.
            let u = if len * len < DEGENERATE_LENGTH_SQ { [1.0, 0.0] } else { [delta[0] / len, delta[1] / len] };
            Ok(vec![vec![
                (state.slot(&a.x)?, -u[0]),
                (state.slot(&a.y)?, -u[1]),
                (state.slot(&b.x)?, u[0]),
                (state.slot(&b.y)?, u[1]),
            ]])
        }
        Relation::Angle { a, b } => Ok(vec![relative_angle_gradient(a, b, 1.0, state)?]),
        Relation::Parallel { a, b } => {
            let rel = line_angle(state.direction(b)?) - line_angle(state.direction(a)?);
            Ok(vec![relative_angle_gradient(a, b, rel.cos(), state)?])
        }
        Relation::Perpendicular { a, b } => {
            let rel = line_angle(state.direction(b)?) - line_angle(state.direction(a)?);
            Ok(vec![relative_angle_gradient(a, b, -rel.sin(), state)?])
        }
        Relation::Concentric { a, b } => Ok(vec![
            vec![(state.slot(&a.x)?, -1.0), (state.slot(&b.x)?, 1.0)],
            vec![(state.slot(&a.y)?, -1.0), (state.slot(&b.y)?, 1.0)],
        ]),
        Relation::Tangent { .. } | Relation::Symmetric { .. } => {
            finite_difference(relation, target, state, fd_step)
        }
        Relation::Conditional { condition, then, otherwise } => {
            let width = relation.equation_count();
            let active = if condition.holds(state.value(&condition.parameter)?) {
                Some(then.as_ref())
            } else {
                otherwise.as_deref()
            };
            let mut rows = match active {
                Some(branch) => relation_gradients(branch, target, state, fd_step)?,
                None => Vec::new(),
            };
            rows.resize(width, Vec::new());
            Ok(rows)
        }
        Relation::Pattern { reference, instances, .. } => {
            let mut rows = Vec::with_capacity(2 * instances.len());
            let mut previous = reference;
            for instance in instances {
                rows.push(vec![(state.slot(&instance.x)?, 1.0), (state.slot(&previous.x)?, -1.0)]);
                rows.push(vec![(state.slot(&instance.y)?, 1.0), (state.slot(&previous.y)?, -1.0)]);
                previous = instance;
            }
            Ok(rows)
        }
        Relation::Value { parameter } => Ok(vec![vec![(state.slot(parameter)?, 1.0)]]),
        Relation::Difference { a, b } => Ok(vec![vec![(state.slot(a)?, 1.0), (state.slot(b)?, -1.0)]]),
    }
}

/// Central differences over every parameter the relation reads.
fn finite_difference(
    relation: &Relation,
    target: f64,
    state: StateView<'_>,
    fd_step: f64,
) -> Result<Vec<GradientRow>, EvalError> {
    let width = relation.equation_count();
    let mut rows: Vec<GradientRow> = vec![Vec::new(); width];
    let mut perturbed = state.values.to_vec();

    for id in relation.parameter_ids() {
        let slot = state.slot(&id)?;
        let original = perturbed[slot];
        let h = fd_step * (1.0 + original.abs());

        perturbed[slot] = original + h;
        let plus = relation_residuals(relation, target, state.with_values(&perturbed))?;
        perturbed[slot] = original - h;
        let minus = relation_residuals(relation, target, state.with_values(&perturbed))?;
        perturbed[slot] = original;

        for (row, (p, m)) in rows.iter_mut().zip(plus.iter().zip(minus.iter())) {
            let derivative = (p - m) / (2.0 * h);
            if derivative != 0.0 {
                row.push((slot, derivative));
            }
        }
    }
    Ok(rows)
}
