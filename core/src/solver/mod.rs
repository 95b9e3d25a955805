//! Constraint solving.
//!
//! `solve` snapshots the registries into base units, assembles the active
//! system, runs Newton-Raphson and packs everything into a
//! [`ConstraintSolutionResult`]. The registries are never written here;
//! applying solved values is a separate step on the resolver.

pub mod builder;
pub mod linear;
pub mod newton;
pub mod types;


pub use builder::{incompatible_pairs, ActiveSystem};
pub use types::{
    BoundSide, ConstraintSatisfaction, ConstraintSolutionResult, ParameterAdjustment, Recommendations, SolveMetrics,
    SolveProgress, SolveStatus, SolverConfig, ToleranceSuggestion,
};

use crate::constraints::evaluator::{self, ParameterState};
use crate::constraints::ConstraintRegistry;
use crate::error::EvalError;
use crate::ids::ParameterId;
use crate::parameters::ParameterRegistry;
use newton::{NewtonSolver, Termination};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub fn solve(
    parameters: &ParameterRegistry,
    constraints: &ConstraintRegistry,
    targets: Option<&HashSet<ParameterId>>,
    config: &SolverConfig,
    progress: Option<&mut dyn FnMut(&SolveProgress)>,
) -> Result<ConstraintSolutionResult, EvalError> {
    let started = Instant::now();
    let mut state = ParameterState::from_registry(parameters);
    let system = ActiveSystem::build(
        parameters,
        constraints,
        targets,
        &state,
        config.finite_difference_step,
    )?;
    let contradictions = incompatible_pairs(system.constraints());
    for (a, b, reason) in &contradictions {
        warn!("Constraints '{}' and '{}' cannot both hold: {}", a, b, reason);
    }

    let outcome = NewtonSolver::new(config).run(&system, &mut state, progress)?;

    let mut satisfaction = BTreeMap::new();
    let (mut satisfied_active, mut unsatisfied_active) = (0, 0);
    for constraint in constraints.iter() {
        let error = evaluator::error(constraint, state.view())?;
        let active = system.is_active(&constraint.id);
        let satisfied = error <= constraint.tolerance;
        match (active, satisfied) {
            (true, true) => satisfied_active += 1,
            (true, false) => unsatisfied_active += 1,
            _ => {}
        }
        satisfaction.insert(
            constraint.id.clone(),
            ConstraintSatisfaction {
                satisfied,
                error,
                tolerance: constraint.tolerance,
                driving: constraint.driving,
                active,
            },
        );
    }

    let status = match outcome.termination {
        // Convergence is judged on the residual norm; a constraint tighter
        // than `convergence_tolerance` can still miss its own tolerance.
        Termination::Converged if unsatisfied_active == 0 => SolveStatus::Solved,
        Termination::Converged => SolveStatus::Partial,
        Termination::NonFinite => SolveStatus::Failed,
        _ if !contradictions.is_empty() => SolveStatus::Inconsistent,
        _ if satisfied_active == 0 => SolveStatus::Failed,
        _ => SolveStatus::Partial,
    };

    let mut values = BTreeMap::new();
    for (col, id) in system.parameter_ids().iter().enumerate() {
        if let (Some(parameter), Some(base)) = (parameters.get(id), state.get(id)) {
            values.insert(id.clone(), parameter.unit.from_base(system.bounds()[col].clamp(base)));
        }
    }

    let recommendations = (!status.is_success()).then(|| {
        let mut recommendations = Recommendations::default();
        for (a, b, _) in &contradictions {
            for id in [a, b] {
                if !recommendations.conflicting_constraints.contains(id) {
                    recommendations.conflicting_constraints.push(id.clone());
                }
            }
        }
        for constraint in system.constraints() {
            if let Some(s) = satisfaction.get(&constraint.id) {
                if !s.satisfied && s.error.is_finite() {
                    recommendations.tolerance_suggestions.push(ToleranceSuggestion {
                        constraint_id: constraint.id.clone(),
                        current_tolerance: s.tolerance,
                        suggested_tolerance: round_up(s.error),
                    });
                }
            }
        }
        for (&col, &(side, requested)) in &outcome.pinned {
            let id = &system.parameter_ids()[col];
            if let Some(parameter) = parameters.get(id) {
                let bounds = system.bounds()[col];
                let bound = match side {
                    BoundSide::Min => bounds.min,
                    BoundSide::Max => bounds.max,
                };
                recommendations.parameter_adjustments.push(ParameterAdjustment {
                    parameter_id: id.clone(),
                    side,
                    bound: parameter.unit.from_base(bound),
                    requested: parameter.unit.from_base(requested),
                });
            }
        }
        recommendations
    });

    let message = match outcome.termination {
        Termination::Converged if unsatisfied_active == 0 => format!("Converged in {} iterations", outcome.iterations),
        Termination::Converged => format!(
            "Converged in {} iterations but {} constraint(s) exceed their own tolerance",
            outcome.iterations, unsatisfied_active
        ),
        Termination::IterationCap => format!(
            "Stopped at the iteration cap ({}) with max error {:.3e}",
            outcome.iterations, outcome.max_error
        ),
        Termination::Timeout => format!(
            "Timed out after {} iterations with max error {:.3e}",
            outcome.iterations, outcome.max_error
        ),
        Termination::NonFinite => "Solver produced a non-finite state".to_string(),
    };

    let convergence_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    if status.is_success() {
        info!(
            "Solved {} constraints over {} parameters in {} iterations ({:.2} ms)",
            system.constraints().len(),
            system.column_count(),
            outcome.iterations,
            convergence_time_ms
        );
    } else {
        warn!("Solve finished with status {}: {}", status, message);
    }

    Ok(ConstraintSolutionResult {
        solve_id: Uuid::new_v4(),
        status,
        values,
        constraints: satisfaction,
        metrics: SolveMetrics {
            iterations: outcome.iterations,
            convergence_time_ms,
            max_error: outcome.max_error,
            average_error: outcome.average_error,
            initial_max_error: outcome.initial_max_error,
            error_history: outcome.error_history,
        },
        recommendations,
        message,
    })
}

/// Round up to two significant digits.
fn round_up(error: f64) -> f64 {
    if error <= 0.0 {
        return 0.0;
    }
    let scale = 10f64.powf(error.log10().floor() - 1.0);
    ((error / scale).ceil() * scale).max(error)
}
