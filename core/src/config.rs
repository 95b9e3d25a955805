//! Resolver configuration.
//!
//! Every field has a default, so a partial JSON document such as
//! `{"solver": {"max_iterations": 250}}` is a valid configuration.

use crate::error::ResolverResult;
use crate::solver::SolverConfig;
use serde::{Deserialize, Serialize};

/// Thresholds used by conflict detection and graph health analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Score lost when every constraint is part of an over-constrained set
    pub over_constraint_penalty: f64,
    /// Score lost when no entity is touched by a driving constraint
    pub unconstrained_penalty: f64,
    /// Constraint count below which complexity is `low`
    pub low_complexity_limit: usize,
    pub medium_complexity_limit: usize,
    pub high_complexity_limit: usize,
    /// Shortest cycle, in constraints, reported as a circular dependency
    pub min_cycle_length: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            over_constraint_penalty: 50.0,
            unconstrained_penalty: 30.0,
            low_complexity_limit: 50,
            medium_complexity_limit: 200,
            high_complexity_limit: 1000,
            min_cycle_length: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub solver: SolverConfig,
    pub analysis: AnalysisConfig,
}

impl ResolverConfig {
    pub fn from_json(json: &str) -> ResolverResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }
}
