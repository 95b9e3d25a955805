//! Constraint data model.
//!
//! Constraint relationships are a closed set of typed variants. Each variant
//! carries its operands as parameter ids and has an explicit residual and
//! derivative in [`super::evaluator`]. Targets and tolerances are expressed in
//! base units: millimetres for lengths and radians for angles.

use crate::ids::{ConstraintId, ParameterId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deepest nesting allowed for conditional relations.
pub const MAX_CONDITIONAL_DEPTH: usize = 4;

/// A 2D point made of two coordinate parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointRef {
    pub x: ParameterId,
    pub y: ParameterId,
}

impl PointRef {
    pub fn new(x: impl Into<ParameterId>, y: impl Into<ParameterId>) -> Self {
        Self { x: x.into(), y: y.into() }
    }

    fn signature(&self) -> String {
        format!("({},{})", self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRef {
    pub start: PointRef,
    pub end: PointRef,
}

impl LineRef {
    pub fn new(start: PointRef, end: PointRef) -> Self {
        Self { start, end }
    }

    fn signature(&self) -> String {
        format!("[{}->{}]", self.start.signature(), self.end.signature())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircleRef {
    pub center: PointRef,
    pub radius: ParameterId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

/// Guard of a conditional relation, compared against the parameter's base value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub parameter: ParameterId,
    pub comparison: Comparison,
    pub threshold: f64,
}

impl Condition {
    pub fn holds(&self, value: f64) -> bool {
        match self.comparison {
            Comparison::Less => value < self.threshold,
            Comparison::LessOrEqual => value <= self.threshold,
            Comparison::Greater => value > self.threshold,
            Comparison::GreaterOrEqual => value >= self.threshold,
        }
    }
}

/// Typed geometric relationship between parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Relation {
    /// Euclidean distance between two points.
    Distance { a: PointRef, b: PointRef },
    /// Signed angle from line `a` to line `b`.
    Angle { a: LineRef, b: LineRef },
    Parallel { a: LineRef, b: LineRef },
    Perpendicular { a: LineRef, b: LineRef },
    /// Line touching a circle.
    Tangent { line: LineRef, circle: CircleRef },
    /// Two centres coincide.
    Concentric { a: PointRef, b: PointRef },
    /// `b` is the mirror image of `a` across `axis`.
    Symmetric { a: PointRef, b: PointRef, axis: LineRef },
    /// `then` applies while the condition holds, `otherwise` (if any) when it does not.
    Conditional {
        condition: Condition,
        then: Box<Relation>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<Relation>>,
    },
    /// Linear pattern: each instance sits one spacing (the target) after the
    /// previous one along `direction` (radians).
    Pattern {
        reference: PointRef,
        instances: Vec<PointRef>,
        direction: f64,
    },
    /// A single parameter equals the target.
    Value { parameter: ParameterId },
    /// `a - b` equals the target (zero when absent).
    Difference { a: ParameterId, b: ParameterId },
}

impl Relation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Distance { .. } => "distance",
            Self::Angle { .. } => "angle",
            Self::Parallel { .. } => "parallel",
            Self::Perpendicular { .. } => "perpendicular",
            Self::Tangent { .. } => "tangent",
            Self::Concentric { .. } => "concentric",
            Self::Symmetric { .. } => "symmetric",
            Self::Conditional { .. } => "conditional",
            Self::Pattern { .. } => "pattern",
            Self::Value { .. } => "value",
            Self::Difference { .. } => "difference",
        }
    }

    /// Number of residual rows this relation contributes.
    pub fn equation_count(&self) -> usize {
        match self {
            Self::Concentric { .. } | Self::Symmetric { .. } => 2,
            Self::Pattern { instances, .. } => 2 * instances.len(),
            Self::Conditional { then, otherwise, .. } => {
                let other = otherwise.as_ref().map_or(0, |o| o.equation_count());
                then.equation_count().max(other)
            }
            _ => 1,
        }
    }

    /// Dimensional relations need an explicit target.
    pub fn requires_target(&self) -> bool {
        match self {
            Self::Distance { .. } | Self::Angle { .. } | Self::Pattern { .. } | Self::Value { .. } => true,
            Self::Conditional { then, otherwise, .. } => {
                then.requires_target() || otherwise.as_ref().is_some_and(|o| o.requires_target())
            }
            _ => false,
        }
    }

    /// Relations whose single residual is a signed measurement, so that an
    /// inequality on it is meaningful.
    pub fn is_scalar_measure(&self) -> bool {
        match self {
            Self::Distance { .. } | Self::Angle { .. } | Self::Value { .. } | Self::Difference { .. } => true,
            Self::Tangent { .. } => true,
            Self::Conditional { then, otherwise, .. } => {
                then.is_scalar_measure() && otherwise.as_ref().map_or(true, |o| o.is_scalar_measure())
            }
            _ => false,
        }
    }

    /// Every parameter the relation reads, in first-seen order without duplicates.
    pub fn parameter_ids(&self) -> Vec<ParameterId> {
        let mut ids = Vec::new();
        self.collect_parameters(&mut ids);
        let mut seen = std::collections::HashSet::new();
        ids.retain(|id| seen.insert(id.clone()));
        ids
    }

    fn collect_parameters(&self, out: &mut Vec<ParameterId>) {
        fn point(p: &PointRef, out: &mut Vec<ParameterId>) {
            out.push(p.x.clone());
            out.push(p.y.clone());
        }
        fn line(l: &LineRef, out: &mut Vec<ParameterId>) {
            point(&l.start, out);
            point(&l.end, out);
        }

        match self {
            Self::Distance { a, b } | Self::Concentric { a, b } => {
                point(a, out);
                point(b, out);
            }
            Self::Angle { a, b } | Self::Parallel { a, b } | Self::Perpendicular { a, b } => {
                line(a, out);
                line(b, out);
            }
            Self::Tangent { line: l, circle } => {
                line(l, out);
                point(&circle.center, out);
                out.push(circle.radius.clone());
            }
            Self::Symmetric { a, b, axis } => {
                point(a, out);
                point(b, out);
                line(axis, out);
            }
            Self::Conditional { condition, then, otherwise } => {
                then.collect_parameters(out);
                if let Some(otherwise) = otherwise {
                    otherwise.collect_parameters(out);
                }
                out.push(condition.parameter.clone());
            }
            Self::Pattern { reference, instances, .. } => {
                point(reference, out);
                for instance in instances {
                    point(instance, out);
                }
            }
            Self::Value { parameter } => out.push(parameter.clone()),
            Self::Difference { a, b } => {
                out.push(a.clone());
                out.push(b.clone());
            }
        }
    }

    /// Structural checks beyond parameter existence.
    pub fn check_shape(&self) -> Result<(), String> {
        self.check_shape_at(0)
    }

    fn check_shape_at(&self, depth: usize) -> Result<(), String> {
        match self {
            Self::Pattern { instances, direction, .. } => {
                if instances.is_empty() {
                    return Err("pattern needs at least one instance".to_string());
                }
                if !direction.is_finite() {
                    return Err("pattern direction must be finite".to_string());
                }
                Ok(())
            }
            Self::Conditional { condition, then, otherwise } => {
                if depth >= MAX_CONDITIONAL_DEPTH {
                    return Err(format!("conditional nesting deeper than {}", MAX_CONDITIONAL_DEPTH));
                }
                if !condition.threshold.is_finite() {
                    return Err("condition threshold must be finite".to_string());
                }
                then.check_shape_at(depth + 1)?;
                if let Some(otherwise) = otherwise {
                    otherwise.check_shape_at(depth + 1)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Normalised description of what the relation constrains, ignoring the
    /// target. Two relations with the same signature act on the same quantity.
    pub fn signature(&self) -> String {
        fn ordered(a: String, b: String) -> (String, String) {
            if a <= b { (a, b) } else { (b, a) }
        }

        match self {
            Self::Distance { a, b } => {
                let (a, b) = ordered(a.signature(), b.signature());
                format!("DIST:{}:{}", a, b)
            }
            Self::Concentric { a, b } => {
                let (a, b) = ordered(a.signature(), b.signature());
                format!("CONC:{}:{}", a, b)
            }
            Self::Angle { a, b } => format!("ANGLE:{}:{}", a.signature(), b.signature()),
            Self::Parallel { a, b } => {
                let (a, b) = ordered(a.signature(), b.signature());
                format!("PAR:{}:{}", a, b)
            }
            Self::Perpendicular { a, b } => {
                let (a, b) = ordered(a.signature(), b.signature());
                format!("PERP:{}:{}", a, b)
            }
            Self::Tangent { line, circle } => format!(
                "TAN:{}:{}:{}",
                line.signature(),
                circle.center.signature(),
                circle.radius
            ),
            Self::Symmetric { a, b, axis } => {
                let (a, b) = ordered(a.signature(), b.signature());
                format!("SYM:{}:{}:{}", a, b, axis.signature())
            }
            Self::Conditional { condition, then, otherwise } => format!(
                "COND:{}:{:?}:{}:{}:{}",
                condition.parameter,
                condition.comparison,
                condition.threshold,
                then.signature(),
                otherwise.as_ref().map_or(String::new(), |o| o.signature())
            ),
            Self::Pattern { reference, instances, direction } => format!(
                "PAT:{}:{}:{:.9}",
                reference.signature(),
                instances.iter().map(|p| p.signature()).collect::<Vec<_>>().join(","),
                direction
            ),
            Self::Value { parameter } => format!("VALUE:{}", parameter),
            Self::Difference { a, b } => format!("DIFF:{}:{}", a, b),
        }
    }
}

/// Broad classification of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    Equality,
    /// Only violated values produce a residual.
    Inequality(InequalitySense),
    Geometric,
    Engineering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InequalitySense {
    /// measured >= target
    AtLeast,
    /// measured <= target
    AtMost,
}

/// Ordered from least to most important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

pub const DEFAULT_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometricConstraint {
    pub id: ConstraintId,
    pub kind: ConstraintKind,
    pub relation: Relation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    pub tolerance: f64,
    #[serde(default)]
    pub priority: Priority,
    /// Driving constraints are enforced by the solver; reference constraints
    /// are only measured.
    #[serde(default = "default_driving")]
    pub driving: bool,
    /// Human-readable description, e.g. "distance(a,b)=10". Never evaluated.
    #[serde(default)]
    pub label: String,
}

fn default_driving() -> bool {
    true
}

impl GeometricConstraint {
    pub fn new(id: impl Into<ConstraintId>, relation: Relation, target: Option<f64>) -> Self {
        let kind = match &relation {
            Relation::Value { .. } | Relation::Difference { .. } => ConstraintKind::Engineering,
            Relation::Distance { .. } | Relation::Angle { .. } => ConstraintKind::Equality,
            _ => ConstraintKind::Geometric,
        };
        Self {
            id: id.into(),
            kind,
            relation,
            target,
            tolerance: DEFAULT_TOLERANCE,
            priority: Priority::default(),
            driving: true,
            label: String::new(),
        }
    }

    pub fn distance(id: impl Into<ConstraintId>, a: PointRef, b: PointRef, target: f64) -> Self {
        Self::new(id, Relation::Distance { a, b }, Some(target))
    }

    /// Angle from `a` to `b` in radians.
    pub fn angle(id: impl Into<ConstraintId>, a: LineRef, b: LineRef, radians: f64) -> Self {
        Self::new(id, Relation::Angle { a, b }, Some(radians))
    }

    pub fn parallel(id: impl Into<ConstraintId>, a: LineRef, b: LineRef) -> Self {
        Self::new(id, Relation::Parallel { a, b }, None)
    }

    pub fn perpendicular(id: impl Into<ConstraintId>, a: LineRef, b: LineRef) -> Self {
        Self::new(id, Relation::Perpendicular { a, b }, None)
    }

    pub fn tangent(id: impl Into<ConstraintId>, line: LineRef, circle: CircleRef) -> Self {
        Self::new(id, Relation::Tangent { line, circle }, None)
    }

    pub fn concentric(id: impl Into<ConstraintId>, a: PointRef, b: PointRef) -> Self {
        Self::new(id, Relation::Concentric { a, b }, None)
    }

    pub fn symmetric(id: impl Into<ConstraintId>, a: PointRef, b: PointRef, axis: LineRef) -> Self {
        Self::new(id, Relation::Symmetric { a, b, axis }, None)
    }

    pub fn pattern(
        id: impl Into<ConstraintId>,
        reference: PointRef,
        instances: Vec<PointRef>,
        direction: f64,
        spacing: f64,
    ) -> Self {
        Self::new(id, Relation::Pattern { reference, instances, direction }, Some(spacing))
    }

    pub fn value(id: impl Into<ConstraintId>, parameter: impl Into<ParameterId>, target: f64) -> Self {
        Self::new(id, Relation::Value { parameter: parameter.into() }, Some(target))
    }

    pub fn difference(
        id: impl Into<ConstraintId>,
        a: impl Into<ParameterId>,
        b: impl Into<ParameterId>,
        target: f64,
    ) -> Self {
        Self::new(id, Relation::Difference { a: a.into(), b: b.into() }, Some(target))
    }

    pub fn conditional(
        id: impl Into<ConstraintId>,
        condition: Condition,
        then: Relation,
        otherwise: Option<Relation>,
        target: Option<f64>,
    ) -> Self {
        let relation = Relation::Conditional {
            condition,
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        };
        Self::new(id, relation, target)
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_kind(mut self, kind: ConstraintKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Mark as a measured-only reference constraint.
    pub fn reference(mut self) -> Self {
        self.driving = false;
        self
    }

    pub fn referenced_parameters(&self) -> Vec<ParameterId> {
        self.relation.parameter_ids()
    }

    /// Target used by the residual; `0` for purely geometric relations.
    pub fn effective_target(&self) -> f64 {
        self.target.unwrap_or(0.0)
    }
}
