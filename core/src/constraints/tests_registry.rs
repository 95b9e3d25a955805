use super::*;
use crate::parameters::GeometricParameter;

fn parameters() -> ParameterRegistry {
    let mut registry = ParameterRegistry::new();
    for id in ["p1.x", "p1.y", "p2.x", "p2.y"] {
        registry.add(GeometricParameter::coordinate(id, 0.0)).unwrap();
    }
    registry.add(GeometricParameter::length("width", 40.0)).unwrap();
    registry
}

fn p1() -> PointRef {
    PointRef::new("p1.x", "p1.y")
}

fn p2() -> PointRef {
    PointRef::new("p2.x", "p2.y")
}

#[test]
fn test_add_distance_constraint() {
    let params = parameters();
    let mut registry = ConstraintRegistry::new();
    registry
        .add(GeometricConstraint::distance("d1", p1(), p2(), 10.0), &params)
        .unwrap();

    let stored = registry.get(&"d1".into()).unwrap();
    assert_eq!(stored.kind, ConstraintKind::Equality);
    assert_eq!(stored.referenced_parameters().len(), 4);
    assert!(stored.driving);
}

#[test]
fn test_unknown_parameter_leaves_registry_untouched() {
    let params = parameters();
    let mut registry = ConstraintRegistry::new();
    let result = registry.add(
        GeometricConstraint::distance("d1", p1(), PointRef::new("p3.x", "p3.y"), 10.0),
        &params,
    );

    assert!(matches!(result, Err(ValidationError::UnknownParameter { .. })));
    assert!(registry.is_empty());
}

#[test]
fn test_missing_target_rejected() {
    let params = parameters();
    let mut registry = ConstraintRegistry::new();
    let constraint = GeometricConstraint::new("v", Relation::Value { parameter: "width".into() }, None);
    assert!(matches!(
        registry.add(constraint, &params),
        Err(ValidationError::MissingTarget(_))
    ));
}

#[test]
fn test_duplicate_and_blank_ids_rejected() {
    let params = parameters();
    let mut registry = ConstraintRegistry::new();
    registry.add(GeometricConstraint::value("v", "width", 50.0), &params).unwrap();

    assert!(matches!(
        registry.add(GeometricConstraint::value("v", "width", 60.0), &params),
        Err(ValidationError::DuplicateId { .. })
    ));
    assert!(matches!(
        registry.add(GeometricConstraint::value("", "width", 60.0), &params),
        Err(ValidationError::EmptyId { .. })
    ));
    assert_eq!(registry.get(&"v".into()).unwrap().target, Some(50.0));
}

#[test]
fn test_empty_pattern_rejected() {
    let params = parameters();
    let mut registry = ConstraintRegistry::new();
    let result = registry.add(GeometricConstraint::pattern("pat", p1(), vec![], 0.0, 5.0), &params);
    assert!(matches!(result, Err(ValidationError::InvalidRelation { .. })));
}

#[test]
fn test_inequality_requires_scalar_relation() {
    let params = parameters();
    let mut registry = ConstraintRegistry::new();
    let concentric = GeometricConstraint::concentric("c", p1(), p2())
        .with_kind(ConstraintKind::Inequality(InequalitySense::AtLeast));
    assert!(matches!(
        registry.add(concentric, &params),
        Err(ValidationError::InvalidRelation { .. })
    ));

    let min_width = GeometricConstraint::value("min", "width", 10.0)
        .with_kind(ConstraintKind::Inequality(InequalitySense::AtLeast));
    assert!(registry.add(min_width, &params).is_ok());
}

#[test]
fn test_tolerance_is_clamped() {
    let params = parameters();
    let mut registry = ConstraintRegistry::new();
    registry
        .add(GeometricConstraint::value("v", "width", 40.0).with_tolerance(-1.0), &params)
        .unwrap();
    assert_eq!(registry.get(&"v".into()).unwrap().tolerance, 0.0);

    assert_eq!(registry.set_tolerance(&"v".into(), f64::NAN), Some(0.0));
    assert_eq!(registry.get(&"v".into()).unwrap().tolerance, 0.0);
}

#[test]
fn test_conditional_nesting_limit() {
    let params = parameters();
    let mut registry = ConstraintRegistry::new();
    let condition = Condition {
        parameter: "width".into(),
        comparison: Comparison::Greater,
        threshold: 0.0,
    };
    let mut relation = Relation::Value { parameter: "width".into() };
    for _ in 0..=types::MAX_CONDITIONAL_DEPTH {
        relation = Relation::Conditional {
            condition: condition.clone(),
            then: Box::new(relation),
            otherwise: None,
        };
    }
    let result = registry.add(GeometricConstraint::new("deep", relation, Some(1.0)), &params);
    assert!(matches!(result, Err(ValidationError::InvalidRelation { .. })));
}

#[test]
fn test_driving_flag_and_users() {
    let params = parameters();
    let mut registry = ConstraintRegistry::new();
    registry
        .add(GeometricConstraint::distance("d1", p1(), p2(), 10.0), &params)
        .unwrap();
    registry.add(GeometricConstraint::value("v", "width", 40.0), &params).unwrap();

    assert_eq!(registry.set_driving(&"d1".into(), false), Some(true));
    assert_eq!(registry.driving().count(), 1);
    assert_eq!(registry.users_of(&"p2.y".into()).len(), 1);
    assert_eq!(registry.position(&"v".into()), Some(1));

    registry.remove(&"d1".into());
    assert_eq!(registry.position(&"v".into()), Some(0));
    assert!(registry.set_driving(&"d1".into(), true).is_none());
}
