use super::*;
use crate::analysis::conflicts::ConflictType;
use crate::constraints::PointRef;
use crate::entities::EntityType;
use crate::error::ValidationError;
use crate::solver::SolveStatus;
use std::sync::{Arc, Mutex};

fn p(name: &str) -> PointRef {
    PointRef::new(format!("{name}.x"), format!("{name}.y"))
}

fn with_points(points: &[(&str, f64, f64)]) -> ConstraintResolver {
    let mut resolver = ConstraintResolver::default();
    for (name, x, y) in points {
        let (px, py) = (format!("{name}.x"), format!("{name}.y"));
        resolver.add_parameter(GeometricParameter::coordinate(px.as_str(), *x)).unwrap();
        resolver.add_parameter(GeometricParameter::coordinate(py.as_str(), *y)).unwrap();
        resolver
            .add_entity(GeometricEntity::point(*name, px.as_str(), py.as_str()))
            .unwrap();
    }
    resolver
}

fn record_events(resolver: &mut ConstraintResolver) -> Arc<Mutex<Vec<ResolverEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    resolver.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    log
}

#[test]
fn test_adds_emit_created_events() {
    let mut resolver = ConstraintResolver::default();
    let log = record_events(&mut resolver);

    resolver.add_parameter(GeometricParameter::length("w", 10.0)).unwrap();
    resolver.add_constraint(GeometricConstraint::value("w10", "w", 10.0)).unwrap();

    let log = log.lock().unwrap();
    assert_eq!(
        *log,
        vec![
            ResolverEvent::ParameterCreated { id: "w".into() },
            ResolverEvent::ConstraintCreated { id: "w10".into() },
        ]
    );
}

#[test]
fn test_rejected_add_leaves_state_untouched() {
    let mut resolver = with_points(&[("a", 0.0, 0.0)]);
    let log = record_events(&mut resolver);

    let result = resolver.add_constraint(GeometricConstraint::distance("d", p("a"), p("missing"), 1.0));
    assert!(matches!(
        result,
        Err(ResolverError::Validation(ValidationError::UnknownParameter { .. }))
    ));
    assert_eq!(resolver.constraint_count(), 0);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_parameter_in_use_cannot_be_removed() {
    let mut resolver = with_points(&[("a", 0.0, 0.0), ("b", 3.0, 0.0)]);
    resolver
        .add_constraint(GeometricConstraint::distance("ab", p("a"), p("b"), 4.0))
        .unwrap();

    let err = resolver.remove_parameter(&"a.x".into()).unwrap_err();
    match err {
        ResolverError::ParameterInUse { users, .. } => {
            assert!(users.contains("constraint 'ab'"));
            assert!(users.contains("entity 'a'"));
        }
        other => panic!("unexpected error: {other}"),
    }

    resolver.remove_constraint(&"ab".into()).unwrap();
    resolver.remove_entity(&"a".into()).unwrap();
    assert!(resolver.remove_parameter(&"a.x".into()).is_ok());
    assert!(matches!(
        resolver.remove_parameter(&"a.x".into()),
        Err(ResolverError::UnknownParameter(_))
    ));
}

#[test]
fn test_solve_does_not_write_until_applied() {
    let mut resolver = with_points(&[("p1", 0.0, 0.0), ("p2", 5.0, 0.0)]);
    resolver
        .add_constraint(GeometricConstraint::distance("d", p("p1"), p("p2"), 10.0).with_tolerance(0.01))
        .unwrap();
    let log = record_events(&mut resolver);

    let result = resolver.solve(None).unwrap();
    assert_eq!(result.status, SolveStatus::Solved);
    assert_eq!(resolver.parameter(&"p2.x".into()).unwrap().value, 5.0);
    assert_eq!(resolver.last_result().map(|r| r.solve_id), Some(result.solve_id));

    let count = resolver.apply_solved_values(&result).unwrap();
    assert_eq!(count, result.values.len());
    let value = |id: &str| resolver.parameter(&id.into()).unwrap().value;
    let distance = ((value("p2.x") - value("p1.x")).powi(2) + (value("p2.y") - value("p1.y")).powi(2)).sqrt();
    assert!((distance - 10.0).abs() <= 0.01);

    let log = log.lock().unwrap();
    assert_eq!(
        *log,
        vec![ResolverEvent::ValuesApplied {
            solve_id: result.solve_id,
            count
        }]
    );
}

#[test]
fn test_failed_solve_lists_conflicting_constraints() {
    let mut resolver = with_points(&[("p1", 0.0, 0.0), ("p2", 5.0, 0.0)]);
    resolver
        .add_constraint(GeometricConstraint::distance("d10", p("p1"), p("p2"), 10.0))
        .unwrap();
    resolver
        .add_constraint(GeometricConstraint::distance("d20", p("p1"), p("p2"), 20.0))
        .unwrap();

    let result = resolver.solve(None).unwrap();
    assert!(matches!(result.status, SolveStatus::Inconsistent | SolveStatus::Failed));
    let recommendations = result.recommendations.as_ref().unwrap();
    for id in ["d10", "d20"] {
        assert!(recommendations.conflicting_constraints.contains(&id.into()));
    }
}

#[test]
fn test_progress_is_reported_through_resolver() {
    let mut resolver = with_points(&[("p1", 0.0, 0.0), ("p2", 5.0, 0.0)]);
    resolver
        .add_constraint(GeometricConstraint::distance("d", p("p1"), p("p2"), 10.0))
        .unwrap();

    let mut iterations = Vec::new();
    let result = resolver
        .solve_with_progress(None, &mut |progress: &SolveProgress| iterations.push(progress.iteration))
        .unwrap();
    assert!(!iterations.is_empty());
    assert_eq!(iterations.len(), result.metrics.iterations);
}

#[test]
fn test_set_driving_only_emits_on_change() {
    let mut resolver = with_points(&[("p1", 0.0, 0.0), ("p2", 5.0, 0.0)]);
    resolver
        .add_constraint(GeometricConstraint::distance("d", p("p1"), p("p2"), 10.0))
        .unwrap();
    let log = record_events(&mut resolver);

    resolver.set_driving(&"d".into(), true).unwrap();
    resolver.set_driving(&"d".into(), false).unwrap();
    resolver.set_tolerance(&"d".into(), -1.0).unwrap();

    assert_eq!(resolver.constraint(&"d".into()).unwrap().tolerance, 0.0);
    assert_eq!(log.lock().unwrap().len(), 2);
    assert!(matches!(
        resolver.set_driving(&"nope".into(), false),
        Err(ResolverError::UnknownConstraint(_))
    ));
}

#[test]
fn test_repair_breaks_cycle_and_replay_is_a_no_op() {
    let mut resolver = with_points(&[("a", 0.0, 0.0), ("b", 10.0, 0.0), ("c", 5.0, 8.0)]);
    for (id, from, to) in [("ab", "a", "b"), ("bc", "b", "c"), ("ca", "c", "a")] {
        resolver
            .add_constraint(GeometricConstraint::distance(id, p(from), p(to), 10.0))
            .unwrap();
    }

    let report = resolver.detect_constraint_conflicts();
    assert_eq!(report.of_type(ConflictType::CircularDependency).len(), 1);

    let repaired = resolver.auto_repair_constraints(&report.conflicts).unwrap();
    assert!(repaired.success);
    assert_eq!(repaired.demoted.len(), 1);
    let demoted = &repaired.demoted[0];
    assert!(!resolver.constraint(demoted).unwrap().driving);
    assert!(resolver
        .detect_constraint_conflicts()
        .of_type(ConflictType::CircularDependency)
        .is_empty());

    let again = resolver.auto_repair_constraints(&report.conflicts).unwrap();
    assert!(again.success);
    assert!(again.demoted.is_empty() && again.removed.is_empty());
}

#[test]
fn test_removed_duplicate_is_remembered() {
    let mut resolver = with_points(&[("p1", 0.0, 0.0), ("p2", 5.0, 0.0)]);
    resolver
        .add_constraint(GeometricConstraint::distance("d", p("p1"), p("p2"), 10.0))
        .unwrap();
    resolver
        .add_constraint(GeometricConstraint::distance("d_again", p("p2"), p("p1"), 10.0))
        .unwrap();

    let report = resolver.detect_constraint_conflicts();
    let repaired = resolver.auto_repair_constraints(&report.conflicts).unwrap();
    assert_eq!(repaired.removed, vec![ConstraintId::from("d")]);
    assert!(resolver.constraint(&"d".into()).is_none());

    let again = resolver.auto_repair_constraints(&report.conflicts).unwrap();
    assert!(again.success);
    assert!(again.removed.is_empty());
    assert!(resolver.detect_constraint_conflicts().is_empty());
}

#[test]
fn test_repair_with_unknown_constraint_fails_without_changes() {
    let mut resolver = with_points(&[("p1", 0.0, 0.0), ("p2", 5.0, 0.0)]);
    resolver
        .add_constraint(GeometricConstraint::distance("d", p("p1"), p("p2"), 10.0))
        .unwrap();
    let conflict = ConstraintConflict {
        conflict_type: ConflictType::CircularDependency,
        constraint_ids: vec!["d".into(), "ghost".into()],
        entity_ids: vec![],
        severity: crate::analysis::conflicts::Severity::High,
        suggestion: String::new(),
        suggested_tolerance: None,
    };

    assert!(matches!(
        resolver.auto_repair_constraints(&[conflict]),
        Err(ResolverError::UnknownConstraint(_))
    ));
    assert!(resolver.constraint(&"d".into()).unwrap().driving);
}

#[test]
fn test_document_round_trip_keeps_links_and_order() {
    let mut resolver = with_points(&[("a", 0.0, 0.0), ("b", 10.0, 0.0)]);
    let mut line = GeometricEntity::new("line", EntityType::Line, vec![]);
    line.children = vec!["a".into(), "b".into()];
    resolver.add_entity(line).unwrap();
    resolver
        .add_constraint(GeometricConstraint::distance("ab", p("a"), p("b"), 12.0))
        .unwrap();
    resolver.solve(None).unwrap();

    let json = resolver.to_json().unwrap();
    let restored = ConstraintResolver::from_json(&json, ResolverConfig::default()).unwrap();

    let (before, after) = (resolver.to_document(), restored.to_document());
    assert_eq!(after.parameters, before.parameters);
    assert_eq!(after.entities, before.entities);
    assert_eq!(after.constraints, before.constraints);
    assert_eq!(restored.entity(&"a".into()).unwrap().parent, Some("line".into()));
    assert_eq!(restored.entity(&"line".into()).unwrap().children.len(), 2);
    assert_eq!(
        restored.last_result().map(|r| r.solve_id),
        resolver.last_result().map(|r| r.solve_id)
    );
}

#[test]
fn test_invalid_document_is_rejected() {
    let mut document = with_points(&[("a", 0.0, 0.0)]).to_document();
    document.constraints.push(GeometricConstraint::value("bad", "nowhere", 1.0));
    assert!(matches!(
        ConstraintResolver::from_document(document, ResolverConfig::default()),
        Err(ResolverError::Validation(_))
    ));
    assert!(matches!(
        ConstraintResolver::from_json("[1, 2", ResolverConfig::default()),
        Err(ResolverError::Document(_))
    ));
}

#[test]
fn test_document_with_two_parents_for_one_entity_is_rejected() {
    let mut resolver = with_points(&[("a", 0.0, 0.0)]);
    for id in ["left", "right"] {
        resolver
            .add_entity(GeometricEntity::new(id, EntityType::Surface, vec![]))
            .unwrap();
    }
    let mut document = resolver.to_document();
    for entity in document.entities.iter_mut().filter(|e| e.id.as_str() != "a") {
        entity.children = vec!["a".into()];
    }

    assert!(matches!(
        ConstraintResolver::from_document(document, ResolverConfig::default()),
        Err(ResolverError::Validation(ValidationError::SecondParent { .. }))
    ));
}

#[test]
fn test_graph_analysis_through_resolver() {
    let mut resolver = with_points(&[("a", 0.0, 0.0), ("b", 10.0, 0.0), ("c", 0.0, 5.0)]);
    resolver
        .add_constraint(GeometricConstraint::distance("ab", p("a"), p("b"), 10.0))
        .unwrap();

    let analysis = resolver.analyze_relation_graph();
    assert_eq!(analysis.topology.entity_count, 3);
    assert_eq!(analysis.topology.constraint_count, 1);
    assert_eq!(analysis.health.unconstrained_entities, 1);
    assert!(analysis.health.score < 100.0);
}
