//! Structural analysis: dependency graph, conflicts, repair and health.

pub mod conflicts;
pub mod graph;
pub mod health;
pub mod repair;

#[cfg(test)]
mod tests_conflicts;

pub use conflicts::{
    ConflictDetector, ConflictReport, ConflictSummary, ConflictType, ConstraintConflict, Severity,
};
pub use graph::{Cycle, DependencyGraph, NodeId};
pub use health::{Complexity, GraphAnalysis, HealthMetrics, PerformanceEstimate, TopologyMetrics};
pub use repair::{RepairAction, RepairOptions, RepairPlan, RepairReport};
