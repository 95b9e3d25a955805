//! Error types for the resolver.
//!
//! Structural problems are reported at `add_*` time as [`ValidationError`].
//! Ordinary non-convergence is never an error; it is a
//! [`SolveStatus`](crate::solver::SolveStatus) on the result.

use crate::ids::{ConstraintId, EntityId, ParameterId};
use thiserror::Error;

/// A violated structural rule, raised before any registry mutation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{kind} id must not be empty")]
    EmptyId { kind: &'static str },

    #[error("{kind} '{id}' already exists")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Invalid bounds for parameter '{id}': min ({min}) must be less than max ({max})")]
    InvalidBounds { id: ParameterId, min: f64, max: f64 },

    #[error("Parameter '{id}' has a non-finite {field}")]
    NonFiniteValue { id: ParameterId, field: &'static str },

    #[error("Unknown parameter '{parameter}' referenced by '{owner}'")]
    UnknownParameter { owner: String, parameter: ParameterId },

    #[error("Unknown entity '{entity}' referenced by '{owner}'")]
    UnknownEntity { owner: EntityId, entity: EntityId },

    #[error("Entity '{child}' already belongs to '{parent}'")]
    SecondParent { child: EntityId, parent: EntityId },

    #[error("Constraint '{0}' does not reference any parameter")]
    EmptyParameterSet(ConstraintId),

    #[error("Constraint '{0}' requires a target value")]
    MissingTarget(ConstraintId),

    #[error("Constraint '{id}' is malformed: {reason}")]
    InvalidRelation { id: ConstraintId, reason: String },
}

/// Failure to evaluate a residual or Jacobian contribution.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("Parameter '{0}' is not part of the evaluated system")]
    UnknownParameter(ParameterId),

    #[error("Relation '{relation}' is not supported as {context}")]
    Unsupported { relation: &'static str, context: &'static str },
}

/// Top-level error of every fallible resolver operation.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error("Constraint '{0}' not found")]
    UnknownConstraint(ConstraintId),

    #[error("Parameter '{0}' not found")]
    UnknownParameter(ParameterId),

    #[error("Entity '{0}' not found")]
    UnknownEntity(EntityId),

    #[error("Parameter '{parameter}' is still referenced by {users}")]
    ParameterInUse { parameter: ParameterId, users: String },

    #[error("Invalid repair request: {0}")]
    InvalidRepair(String),

    #[error("Document error: {0}")]
    Document(#[from] serde_json::Error),
}

/// Result type for resolver operations.
pub type ResolverResult<T> = Result<T, ResolverError>;
