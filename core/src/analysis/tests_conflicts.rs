use super::*;
use crate::config::AnalysisConfig;
use crate::constraints::{
    ConstraintKind, ConstraintRegistry, GeometricConstraint, InequalitySense, PointRef, Priority,
};
use crate::entities::{EntityRegistry, GeometricEntity};
use crate::error::ResolverError;
use crate::ids::ConstraintId;
use crate::parameters::{GeometricParameter, ParameterRegistry};
use crate::solver::{self, SolverConfig};
use std::collections::HashSet;

struct Scene {
    parameters: ParameterRegistry,
    entities: EntityRegistry,
    constraints: ConstraintRegistry,
    config: AnalysisConfig,
}

impl Scene {
    fn with_points(names: &[(&str, f64, f64)]) -> Self {
        let mut parameters = ParameterRegistry::new();
        let mut entities = EntityRegistry::new();
        for (name, x, y) in names {
            let (px, py) = (format!("{name}.x"), format!("{name}.y"));
            parameters.add(GeometricParameter::coordinate(px.as_str(), *x)).unwrap();
            parameters.add(GeometricParameter::coordinate(py.as_str(), *y)).unwrap();
            entities
                .add(GeometricEntity::point(*name, px.as_str(), py.as_str()), &parameters)
                .unwrap();
        }
        Self {
            parameters,
            entities,
            constraints: ConstraintRegistry::new(),
            config: AnalysisConfig::default(),
        }
    }

    fn add(&mut self, constraint: GeometricConstraint) {
        self.constraints.add(constraint, &self.parameters).unwrap();
    }

    fn detect(&self) -> ConflictReport {
        ConflictDetector::new(&self.parameters, &self.entities, &self.constraints, &self.config).detect(None)
    }
}

fn p(name: &str) -> PointRef {
    PointRef::new(format!("{name}.x"), format!("{name}.y"))
}

fn ids(conflict: &ConstraintConflict) -> Vec<&str> {
    let mut out: Vec<&str> = conflict.constraint_ids.iter().map(|c| c.as_str()).collect();
    out.sort();
    out
}

#[test]
fn test_contradictory_distances_reported_as_inconsistent() {
    let mut scene = Scene::with_points(&[("p1", 0.0, 0.0), ("p2", 5.0, 0.0)]);
    scene.add(GeometricConstraint::distance("d10", p("p1"), p("p2"), 10.0));
    scene.add(GeometricConstraint::distance("d20", p("p1"), p("p2"), 20.0));

    let report = scene.detect();
    let inconsistent = report.of_type(ConflictType::Inconsistent);
    assert_eq!(inconsistent.len(), 1);
    assert_eq!(ids(inconsistent[0]), vec!["d10", "d20"]);
    assert_eq!(inconsistent[0].severity, Severity::Critical);
    assert_eq!(inconsistent[0].suggested_tolerance, Some(5.0));
    assert!(report.of_type(ConflictType::OverConstrained).is_empty());
    assert_eq!(report.summary.critical, 1);
}

#[test]
fn test_three_cycle_reported_once() {
    let mut scene = Scene::with_points(&[("a", 0.0, 0.0), ("b", 10.0, 0.0), ("c", 5.0, 8.0)]);
    scene.add(GeometricConstraint::distance("ab", p("a"), p("b"), 10.0));
    scene.add(GeometricConstraint::distance("bc", p("b"), p("c"), 10.0));
    scene.add(GeometricConstraint::distance("ca", p("c"), p("a"), 10.0));

    let report = scene.detect();
    let cycles = report.of_type(ConflictType::CircularDependency);
    assert_eq!(cycles.len(), 1);
    assert_eq!(ids(cycles[0]), vec!["ab", "bc", "ca"]);
    assert_eq!(cycles[0].entity_ids.len(), 3);
}

#[test]
fn test_cycle_reported_whatever_the_operand_order() {
    let mut scene = Scene::with_points(&[("a", 0.0, 0.0), ("b", 10.0, 0.0), ("c", 5.0, 8.0)]);
    scene.add(GeometricConstraint::distance("ab", p("a"), p("b"), 10.0));
    scene.add(GeometricConstraint::distance("bc", p("b"), p("c"), 10.0));
    scene.add(GeometricConstraint::distance("ac", p("a"), p("c"), 10.0));

    let report = scene.detect();
    let cycles = report.of_type(ConflictType::CircularDependency);
    assert_eq!(cycles.len(), 1);
    assert_eq!(ids(cycles[0]), vec!["ab", "ac", "bc"]);

    let plan = repair::plan(&report.conflicts, &scene.constraints, &HashSet::new(), RepairOptions::default()).unwrap();
    assert_eq!(plan.actions, vec![RepairAction::Demote("ac".into())]);
}

#[test]
fn test_contradictory_pair_same_report_in_both_orientations() {
    let summarize = |reversed: bool| {
        let mut scene = Scene::with_points(&[("a", 0.0, 0.0), ("b", 5.0, 0.0)]);
        scene.add(GeometricConstraint::distance("d1", p("a"), p("b"), 10.0));
        let (from, to) = if reversed { ("b", "a") } else { ("a", "b") };
        scene.add(GeometricConstraint::distance("d2", p(from), p(to), 20.0));

        let report = scene.detect();
        let kinds: Vec<(ConflictType, Vec<String>)> = report
            .conflicts
            .iter()
            .map(|c| (c.conflict_type, ids(c).into_iter().map(String::from).collect()))
            .collect();
        let plan = repair::plan(&report.conflicts, &scene.constraints, &HashSet::new(), RepairOptions::default()).unwrap();
        (kinds, plan.actions, plan.report.success)
    };

    let forward = summarize(false);
    assert_eq!(forward, summarize(true));
    let (kinds, actions, success) = forward;
    assert!(kinds.contains(&(ConflictType::Inconsistent, vec!["d1".into(), "d2".into()])));
    assert!(kinds.contains(&(ConflictType::CircularDependency, vec!["d1".into(), "d2".into()])));
    // Demoting one member also settles the contradiction.
    assert_eq!(actions, vec![RepairAction::Demote("d2".into())]);
    assert!(success);
}

#[test]
fn test_exact_duplicate_is_over_constrained() {
    let mut scene = Scene::with_points(&[("p1", 0.0, 0.0), ("p2", 5.0, 0.0)]);
    scene.add(GeometricConstraint::distance("d", p("p1"), p("p2"), 10.0));
    scene.add(GeometricConstraint::distance("d_again", p("p2"), p("p1"), 10.0));

    let report = scene.detect();
    let over = report.of_type(ConflictType::OverConstrained);
    assert_eq!(over.len(), 1);
    assert_eq!(over[0].severity, Severity::Low);
    assert!(report.of_type(ConflictType::Inconsistent).is_empty());
}

#[test]
fn test_too_many_equations_for_dof() {
    let mut scene = Scene::with_points(&[]);
    scene.parameters.add(GeometricParameter::length("w", 12.0)).unwrap();
    scene.add(GeometricConstraint::value("w10", "w", 10.0).with_priority(Priority::High));
    scene.add(
        GeometricConstraint::value("w_max", "w", 20.0)
            .with_kind(ConstraintKind::Inequality(InequalitySense::AtMost))
            .with_priority(Priority::Low),
    );

    let report = scene.detect();
    let over = report.of_type(ConflictType::OverConstrained);
    assert_eq!(over.len(), 1);
    assert_eq!(over[0].severity, Severity::High);
    assert!(over[0].suggestion.contains("w_max"));
    assert!(over[0].entity_ids.is_empty());
}

#[test]
fn test_unsatisfied_pairs_from_last_solve() {
    let mut scene = Scene::with_points(&[("a", 0.0, 0.0)]);
    scene.parameters.add(GeometricParameter::coordinate("b.x", 0.0)).unwrap();
    scene.add(GeometricConstraint::value("a_one", "a.x", 1.0));
    scene.add(GeometricConstraint::value("b_three", "b.x", 3.0));
    scene.add(GeometricConstraint::difference("gap", "b.x", "a.x", 8.0));

    let result = solver::solve(&scene.parameters, &scene.constraints, None, &SolverConfig::default(), None).unwrap();
    assert!(!result.status.is_success());

    let report = ConflictDetector::new(&scene.parameters, &scene.entities, &scene.constraints, &scene.config)
        .detect(Some(&result));
    let inconsistent = report.of_type(ConflictType::Inconsistent);
    let pairs: Vec<Vec<&str>> = inconsistent.iter().map(|c| ids(c)).collect();
    assert_eq!(pairs, vec![vec!["a_one", "gap"], vec!["b_three", "gap"]]);
    assert!(inconsistent.iter().all(|c| c.severity == Severity::Medium));

    // Without a solve result only provable contradictions are reported.
    assert!(scene.detect().of_type(ConflictType::Inconsistent).is_empty());
}

#[test]
fn test_no_conflicts_for_well_posed_scene() {
    let mut scene = Scene::with_points(&[("p1", 0.0, 0.0), ("p2", 5.0, 0.0)]);
    scene.add(GeometricConstraint::distance("d", p("p1"), p("p2"), 10.0));
    let report = scene.detect();
    assert!(report.is_empty());
    assert_eq!(report.summary, ConflictSummary::default());
}

#[test]
fn test_repair_demotes_one_cycle_member() {
    let mut scene = Scene::with_points(&[("a", 0.0, 0.0), ("b", 10.0, 0.0), ("c", 5.0, 8.0)]);
    scene.add(GeometricConstraint::distance("ab", p("a"), p("b"), 10.0).with_priority(Priority::High));
    scene.add(GeometricConstraint::distance("bc", p("b"), p("c"), 10.0));
    scene.add(GeometricConstraint::distance("ca", p("c"), p("a"), 10.0));

    let report = scene.detect();
    let plan = repair::plan(&report.conflicts, &scene.constraints, &HashSet::new(), RepairOptions::default()).unwrap();

    // Medium ties resolve to the most recently added.
    assert_eq!(plan.actions, vec![RepairAction::Demote("ca".into())]);
    assert!(plan.report.success);
    assert_eq!(plan.report.demoted, vec![ConstraintId::from("ca")]);
}

#[test]
fn test_repair_removes_lowest_priority_first_added() {
    let mut scene = Scene::with_points(&[]);
    scene.parameters.add(GeometricParameter::length("w", 12.0)).unwrap();
    scene.add(GeometricConstraint::value("keep", "w", 10.0).with_priority(Priority::Critical));
    scene.add(GeometricConstraint::value("first", "w", 10.5).with_priority(Priority::Low));
    scene.add(GeometricConstraint::value("second", "w", 11.0).with_priority(Priority::Low));

    let conflict = ConstraintConflict {
        conflict_type: ConflictType::OverConstrained,
        constraint_ids: vec!["keep".into(), "second".into(), "first".into()],
        entity_ids: vec![],
        severity: Severity::High,
        suggestion: String::new(),
        suggested_tolerance: None,
    };
    let plan = repair::plan(&[conflict], &scene.constraints, &HashSet::new(), RepairOptions::default()).unwrap();
    assert_eq!(plan.actions, vec![RepairAction::Remove("first".into())]);
}

#[test]
fn test_repair_is_a_no_op_once_resolved() {
    let mut scene = Scene::with_points(&[]);
    scene.parameters.add(GeometricParameter::length("w", 12.0)).unwrap();
    scene.add(GeometricConstraint::value("a", "w", 10.0));
    let conflict = ConstraintConflict {
        conflict_type: ConflictType::OverConstrained,
        constraint_ids: vec!["a".into(), "gone".into()],
        entity_ids: vec![],
        severity: Severity::Low,
        suggestion: String::new(),
        suggested_tolerance: None,
    };

    let unknown = repair::plan(
        std::slice::from_ref(&conflict),
        &scene.constraints,
        &HashSet::new(),
        RepairOptions::default(),
    );
    assert!(matches!(unknown, Err(ResolverError::UnknownConstraint(_))));

    let tombstones: HashSet<ConstraintId> = [ConstraintId::from("gone")].into_iter().collect();
    let plan = repair::plan(&[conflict], &scene.constraints, &tombstones, RepairOptions::default()).unwrap();
    assert!(plan.actions.is_empty());
    assert!(plan.report.success);
}

#[test]
fn test_tolerance_relaxation_only_applied_on_request() {
    let mut scene = Scene::with_points(&[("p1", 0.0, 0.0), ("p2", 5.0, 0.0)]);
    scene.add(GeometricConstraint::distance("d10", p("p1"), p("p2"), 10.0));
    scene.add(GeometricConstraint::distance("d20", p("p1"), p("p2"), 20.0));
    let inconsistent: Vec<ConstraintConflict> =
        scene.detect().of_type(ConflictType::Inconsistent).into_iter().cloned().collect();

    let suggested = repair::plan(&inconsistent, &scene.constraints, &HashSet::new(), RepairOptions::default()).unwrap();
    assert!(suggested.actions.is_empty());
    assert!(!suggested.report.success);
    assert_eq!(suggested.report.suggestions.len(), 1);

    let applied = repair::plan(
        &inconsistent,
        &scene.constraints,
        &HashSet::new(),
        RepairOptions {
            apply_tolerance_relaxation: true,
        },
    )
    .unwrap();
    assert_eq!(applied.actions.len(), 2);
    assert_eq!(applied.report.modified.len(), 2);
    assert!(applied.report.success);
}
