//! Read-only diagnostics over the registries.

use super::conflicts::{ConflictType, ConflictReport};
use super::graph::DependencyGraph;
use crate::config::AnalysisConfig;
use crate::constraints::ConstraintRegistry;
use crate::entities::EntityRegistry;
use crate::ids::{ConstraintId, ParameterId};
use crate::parameters::ParameterRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Bytes per dense Jacobian entry plus bookkeeping per constraint.
const BYTES_PER_ENTRY: f64 = 8.0;
const BYTES_PER_CONSTRAINT: f64 = 512.0;
/// Rough cost of one multiply-add in the dense linear solve, in ms.
const MS_PER_FLOP: f64 = 2.0e-6;
const EXPECTED_ITERATIONS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
    Extreme,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyMetrics {
    pub entity_count: usize,
    pub constraint_count: usize,
    pub parameter_count: usize,
    pub layer_count: usize,
    /// Mean number of entities each driving constraint touches
    pub average_connectivity: f64,
    pub max_dependency_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    /// 0 (unusable) to 100 (healthy)
    pub score: f64,
    pub over_constrained_ratio: f64,
    pub unconstrained_entities: usize,
    pub unconstrained_ratio: f64,
    pub conflict_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEstimate {
    pub estimated_solve_ms: f64,
    pub estimated_memory_bytes: u64,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphAnalysis {
    pub topology: TopologyMetrics,
    pub health: HealthMetrics,
    pub performance: PerformanceEstimate,
}

pub fn analyze(
    parameters: &ParameterRegistry,
    entities: &EntityRegistry,
    constraints: &ConstraintRegistry,
    conflicts: &ConflictReport,
    config: &AnalysisConfig,
) -> GraphAnalysis {
    let graph = DependencyGraph::build(parameters, entities, constraints);

    let layers: HashSet<&str> = entities
        .iter()
        .map(|e| e.layer.as_deref().unwrap_or("default"))
        .collect();
    let fan_out = graph.entities_per_constraint();
    let average_connectivity = if fan_out.is_empty() {
        0.0
    } else {
        fan_out.iter().map(|(_, e)| e.len()).sum::<usize>() as f64 / fan_out.len() as f64
    };

    let topology = TopologyMetrics {
        entity_count: entities.len(),
        constraint_count: constraints.len(),
        parameter_count: parameters.len(),
        layer_count: layers.len(),
        average_connectivity,
        max_dependency_depth: graph.max_depth(),
    };

    let over_constrained: HashSet<&ConstraintId> = conflicts
        .of_type(ConflictType::OverConstrained)
        .into_iter()
        .flat_map(|c| c.constraint_ids.iter())
        .collect();
    let over_constrained_ratio = ratio(over_constrained.len(), constraints.len());

    let driven: HashSet<ParameterId> = constraints
        .driving()
        .flat_map(|c| c.referenced_parameters())
        .collect();
    let unconstrained_entities = entities
        .iter()
        .filter(|e| !e.parameters.is_empty() && !e.parameters.iter().any(|p| driven.contains(p)))
        .count();
    let unconstrained_ratio = ratio(unconstrained_entities, entities.len());

    let score = (100.0
        - config.over_constraint_penalty * over_constrained_ratio
        - config.unconstrained_penalty * unconstrained_ratio)
        .clamp(0.0, 100.0);

    let health = HealthMetrics {
        score,
        over_constrained_ratio,
        unconstrained_entities,
        unconstrained_ratio,
        conflict_count: conflicts.summary.total,
    };

    GraphAnalysis {
        topology,
        health,
        performance: estimate(constraints, parameters.len(), config),
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Dense Newton cost: rows * cols * min(rows, cols) per iteration.
fn estimate(constraints: &ConstraintRegistry, parameter_count: usize, config: &AnalysisConfig) -> PerformanceEstimate {
    let count = constraints.len();
    let rows = constraints
        .iter()
        .map(|c| c.relation.equation_count())
        .sum::<usize>() as f64;
    let cols = parameter_count.max(1) as f64;

    let flops = rows * cols * rows.min(cols).max(1.0);
    let estimated_solve_ms = EXPECTED_ITERATIONS * flops * MS_PER_FLOP;
    let estimated_memory_bytes = (rows * cols * BYTES_PER_ENTRY + count as f64 * BYTES_PER_CONSTRAINT) as u64;

    let complexity = if count < config.low_complexity_limit {
        Complexity::Low
    } else if count < config.medium_complexity_limit {
        Complexity::Medium
    } else if count < config.high_complexity_limit {
        Complexity::High
    } else {
        Complexity::Extreme
    };

    PerformanceEstimate {
        estimated_solve_ms,
        estimated_memory_bytes,
        complexity,
    }
}
