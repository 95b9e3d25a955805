//! Newton-Raphson iteration with relaxation, backtracking and bounds clamping.

use super::builder::ActiveSystem;
use super::linear::{self, StepMethod};
use super::types::{BoundSide, SolveProgress, SolverConfig};
use crate::constraints::evaluator::ParameterState;
use crate::constraints::Priority;
use crate::error::EvalError;
use nalgebra::DVector;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Converged,
    IterationCap,
    Timeout,
    NonFinite,
}

#[derive(Debug, Clone)]
pub struct NewtonOutcome {
    pub termination: Termination,
    pub iterations: usize,
    pub initial_max_error: f64,
    pub max_error: f64,
    pub average_error: f64,
    pub error_history: Vec<f64>,
    /// Column -> (side, unclamped base value) for the most recent push past a bound
    pub pinned: BTreeMap<usize, (BoundSide, f64)>,
}

pub struct NewtonSolver<'a> {
    config: &'a SolverConfig,
}

impl<'a> NewtonSolver<'a> {
    pub fn new(config: &'a SolverConfig) -> Self {
        Self { config }
    }

    /// One projected step per critical or high priority constraint, in that
    /// order, towards its own zero set.
    pub fn warm_start(&self, system: &ActiveSystem<'_>, state: &mut ParameterState) -> Result<(), EvalError> {
        for priority in [Priority::Critical, Priority::High] {
            for index in 0..system.constraints().len() {
                if system.constraints()[index].priority != priority {
                    continue;
                }
                let (residuals, gradients) = system.constraint_system(index, state)?;
                let mut x = system.column_values(state);
                for (r, gradient) in residuals.iter().zip(gradients.iter()) {
                    let norm_sq: f64 = gradient.iter().map(|(_, g)| g * g).sum();
                    if norm_sq <= f64::EPSILON || !r.is_finite() {
                        continue;
                    }
                    for (col, g) in gradient {
                        x[*col] -= r * g / norm_sq;
                    }
                }
                if x.iter().all(|v| v.is_finite()) {
                    system.store(&x, state);
                }
            }
        }
        Ok(())
    }

    pub fn run(
        &self,
        system: &ActiveSystem<'_>,
        state: &mut ParameterState,
        mut progress: Option<&mut dyn FnMut(&SolveProgress)>,
    ) -> Result<NewtonOutcome, EvalError> {
        let started = Instant::now();
        let relaxation = self.config.effective_relaxation();
        let min_relaxation = self.config.effective_min_relaxation();

        system.clamp_state(state);
        if self.config.smart_initialization {
            self.warm_start(system, state)?;
        }

        let mut residual = system.residuals(state)?;
        let (mut max_error, mut average_error) = error_stats(&residual);
        let mut outcome = NewtonOutcome {
            termination: Termination::IterationCap,
            iterations: 0,
            initial_max_error: max_error,
            max_error,
            average_error,
            error_history: Vec::new(),
            pinned: BTreeMap::new(),
        };

        loop {
            if !max_error.is_finite() {
                outcome.termination = Termination::NonFinite;
                break;
            }
            if max_error < self.config.convergence_tolerance {
                outcome.termination = Termination::Converged;
                break;
            }
            if outcome.iterations >= self.config.max_iterations {
                outcome.termination = Termination::IterationCap;
                break;
            }
            if let Some(limit) = self.config.timeout_ms {
                if started.elapsed().as_millis() >= u128::from(limit) {
                    outcome.termination = Termination::Timeout;
                    break;
                }
            }

            let jacobian = system.jacobian(state)?;
            let (step, method) = linear::solve_step(&jacobian, &(-&residual), self.config.singular_damping);
            if method == StepMethod::Diagonal {
                debug!("Iteration {} used the diagonal approximation", outcome.iterations + 1);
            }
            let x = system.column_values(state);

            // Halve the step while it makes things worse.
            let mut lambda = relaxation;
            let (candidate, candidate_residual, candidate_max, candidate_avg) = loop {
                let unclamped = &x + &step * lambda;
                let mut trial = state.clone();
                system.store(&unclamped, &mut trial);
                let r = system.residuals(&trial)?;
                let (m, a) = error_stats(&r);
                if (m.is_finite() && m <= max_error) || lambda * 0.5 < min_relaxation {
                    record_pins(system, &unclamped, &mut outcome.pinned);
                    break (trial, r, m, a);
                }
                lambda *= 0.5;
            };

            *state = candidate;
            residual = candidate_residual;
            max_error = candidate_max;
            average_error = candidate_avg;
            outcome.iterations += 1;
            outcome.error_history.push(max_error);

            let report = SolveProgress {
                iteration: outcome.iterations,
                max_error,
                average_error,
                relaxation: lambda,
            };
            debug!(
                "Iteration {}: max_error={:.3e} avg_error={:.3e} relaxation={}",
                report.iteration, report.max_error, report.average_error, report.relaxation
            );
            if let Some(callback) = progress.as_mut() {
                callback(&report);
            }
        }

        outcome.max_error = max_error;
        outcome.average_error = average_error;
        Ok(outcome)
    }
}

fn error_stats(residual: &DVector<f64>) -> (f64, f64) {
    if residual.is_empty() {
        return (0.0, 0.0);
    }
    let mut max = 0.0_f64;
    let mut sum = 0.0;
    for r in residual.iter() {
        let a = r.abs();
        if a.is_nan() {
            return (f64::NAN, f64::NAN);
        }
        max = max.max(a);
        sum += a;
    }
    (max, sum / residual.len() as f64)
}

fn record_pins(system: &ActiveSystem<'_>, unclamped: &DVector<f64>, pinned: &mut BTreeMap<usize, (BoundSide, f64)>) {
    for (col, bounds) in system.bounds().iter().enumerate() {
        let value = unclamped[col];
        if value < bounds.min {
            pinned.insert(col, (BoundSide::Min, value));
        } else if value > bounds.max {
            pinned.insert(col, (BoundSide::Max, value));
        } else {
            pinned.remove(&col);
        }
    }
}
