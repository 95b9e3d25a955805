use crate::ids::{ConstraintId, ParameterId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Numeric settings of the Newton-Raphson loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Hard cap on Newton iterations
    pub max_iterations: usize,
    /// Loop terminates once the largest residual drops below this
    pub convergence_tolerance: f64,
    /// Initial step scale, in (0, 1]
    pub relaxation: f64,
    /// Backtracking stops halving the step below this scale
    pub min_relaxation: f64,
    /// Warm-start critical and high priority constraints before iterating
    pub smart_initialization: bool,
    /// Wall-clock limit for a single solve
    pub timeout_ms: Option<u64>,
    /// Relative step of central finite differences
    pub finite_difference_step: f64,
    /// Damping of the pseudo-inverse used for singular systems
    pub singular_damping: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence_tolerance: 1e-6,
            relaxation: 0.8,
            min_relaxation: 1.0 / 64.0,
            smart_initialization: true,
            timeout_ms: None,
            finite_difference_step: 1e-7,
            singular_damping: 1e-9,
        }
    }
}

impl SolverConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_convergence_tolerance(mut self, tolerance: f64) -> Self {
        self.convergence_tolerance = tolerance;
        self
    }

    pub fn with_relaxation(mut self, relaxation: f64) -> Self {
        self.relaxation = relaxation;
        self
    }

    pub fn with_smart_initialization(mut self, enabled: bool) -> Self {
        self.smart_initialization = enabled;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Relaxation clamped into (0, 1]; non-finite values fall back to 1.
    pub fn effective_relaxation(&self) -> f64 {
        if self.relaxation.is_finite() && self.relaxation > 0.0 {
            self.relaxation.min(1.0)
        } else {
            1.0
        }
    }

    pub fn effective_min_relaxation(&self) -> f64 {
        if self.min_relaxation.is_finite() && self.min_relaxation > 0.0 {
            self.min_relaxation.min(self.effective_relaxation())
        } else {
            self.effective_relaxation()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Solved,
    Partial,
    Failed,
    Inconsistent,
}

impl SolveStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Solved)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solved => write!(f, "solved"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
            Self::Inconsistent => write!(f, "inconsistent"),
        }
    }
}

/// Satisfaction of one constraint at the end of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSatisfaction {
    /// `error <= tolerance`
    pub satisfied: bool,
    /// Largest absolute residual, in base units
    pub error: f64,
    pub tolerance: f64,
    /// Reference constraints are measured but never enforced
    pub driving: bool,
    /// Whether the constraint took part in this solve
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveMetrics {
    pub iterations: usize,
    pub convergence_time_ms: f64,
    pub max_error: f64,
    pub average_error: f64,
    /// Max error before the first iteration
    pub initial_max_error: f64,
    /// Max error after each accepted iteration
    pub error_history: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceSuggestion {
    pub constraint_id: ConstraintId,
    pub current_tolerance: f64,
    pub suggested_tolerance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundSide {
    Min,
    Max,
}

/// A parameter pinned at one of its bounds while the solver pushed past it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterAdjustment {
    pub parameter_id: ParameterId,
    pub side: BoundSide,
    /// The bound, in the parameter's unit
    pub bound: f64,
    /// Where the unclamped step wanted to go, in the parameter's unit
    pub requested: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub conflicting_constraints: Vec<ConstraintId>,
    pub tolerance_suggestions: Vec<ToleranceSuggestion>,
    pub parameter_adjustments: Vec<ParameterAdjustment>,
}

/// Immutable outcome of one solve call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSolutionResult {
    pub solve_id: Uuid,
    pub status: SolveStatus,
    /// Solved values in each parameter's own unit
    pub values: BTreeMap<ParameterId, f64>,
    pub constraints: BTreeMap<ConstraintId, ConstraintSatisfaction>,
    pub metrics: SolveMetrics,
    /// Only present when the status is not `Solved`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Recommendations>,
    pub message: String,
}

impl ConstraintSolutionResult {
    pub fn value(&self, id: &ParameterId) -> Option<f64> {
        self.values.get(id).copied()
    }

    pub fn satisfaction(&self, id: &ConstraintId) -> Option<&ConstraintSatisfaction> {
        self.constraints.get(id)
    }

    /// Active driving constraints left unsatisfied.
    pub fn unsatisfied(&self) -> Vec<&ConstraintId> {
        self.constraints
            .iter()
            .filter(|(_, s)| s.active && s.driving && !s.satisfied)
            .map(|(id, _)| id)
            .collect()
    }
}

/// Emitted once per accepted iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveProgress {
    pub iteration: usize,
    pub max_error: f64,
    pub average_error: f64,
    pub relaxation: f64,
}
