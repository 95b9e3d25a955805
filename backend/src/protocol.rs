//! Text protocol spoken over the WebSocket.
//!
//! Frames are `COMMAND` or `COMMAND:payload`. Every command produces one
//! reply frame; failures are reported as `ERROR_UPDATE:{code,message,severity}`.

use resolver_core::analysis::ConstraintConflict;
use resolver_core::constraints::GeometricConstraint;
use resolver_core::entities::GeometricEntity;
use resolver_core::events::ResolverEvent;
use resolver_core::parameters::GeometricParameter;
use resolver_core::{ConstraintResolver, ParameterId, ResolverConfig, ResolverError};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Format a resolver error as a JSON message for the frontend
pub fn format_error(code: &str, message: &str, severity: &str) -> String {
    format!(
        "ERROR_UPDATE:{}",
        json!({
            "code": code,
            "message": message,
            "severity": severity
        })
    )
}

fn error_reply(err: &ResolverError) -> String {
    let code = match err {
        ResolverError::Validation(_) => "VALIDATION_ERROR",
        ResolverError::Evaluation(_) => "EVALUATION_ERROR",
        ResolverError::UnknownConstraint(_) | ResolverError::UnknownParameter(_) | ResolverError::UnknownEntity(_) => {
            "NOT_FOUND"
        }
        ResolverError::ParameterInUse { .. } => "PARAMETER_IN_USE",
        ResolverError::InvalidRepair(_) => "INVALID_REPAIR",
        ResolverError::Document(_) => "DOCUMENT_ERROR",
    };
    warn!("{}: {}", code, err);
    format_error(code, &err.to_string(), "error")
}

fn reply<T: Serialize>(prefix: &str, body: &T) -> String {
    match serde_json::to_string(body) {
        Ok(json) => format!("{}:{}", prefix, json),
        Err(e) => format_error("SERIALIZATION_ERROR", &e.to_string(), "error"),
    }
}

fn parse<T: serde::de::DeserializeOwned>(command: &str, payload: &str) -> Result<T, String> {
    serde_json::from_str(payload).map_err(|e| {
        warn!("Failed to parse {} payload: {}", command, e);
        format_error("PARSE_ERROR", &format!("{}: {}", command, e), "warning")
    })
}

pub fn summary(resolver: &ConstraintResolver) -> serde_json::Value {
    json!({
        "parameters": resolver.parameter_count(),
        "entities": resolver.entity_count(),
        "constraints": resolver.constraint_count(),
        "last_status": resolver.last_result().map(|r| r.status),
    })
}

/// Forward every resolver event to the connected clients.
pub fn attach_events(resolver: &mut ConstraintResolver, events: broadcast::Sender<ResolverEvent>) {
    resolver.subscribe(move |event| {
        // No receivers is fine: nobody is connected.
        let _ = events.send(event.clone());
    });
}

/// Run one command against the resolver and build the reply frame.
pub fn handle_command(
    resolver: &mut ConstraintResolver,
    config: &ResolverConfig,
    events: &broadcast::Sender<ResolverEvent>,
    text: &str,
) -> String {
    let (command, payload) = text.split_once(':').unwrap_or((text, ""));
    let payload = payload.trim();

    match command {
        "ADD_PARAMETER" => match parse::<GeometricParameter>(command, payload) {
            Ok(parameter) => match resolver.add_parameter(parameter) {
                Ok(()) => reply("RESOLVER_UPDATE", &summary(resolver)),
                Err(e) => error_reply(&e),
            },
            Err(frame) => frame,
        },
        "ADD_ENTITY" => match parse::<GeometricEntity>(command, payload) {
            Ok(entity) => match resolver.add_entity(entity) {
                Ok(()) => reply("RESOLVER_UPDATE", &summary(resolver)),
                Err(e) => error_reply(&e),
            },
            Err(frame) => frame,
        },
        "ADD_CONSTRAINT" => match parse::<GeometricConstraint>(command, payload) {
            Ok(constraint) => match resolver.add_constraint(constraint) {
                Ok(()) => reply("RESOLVER_UPDATE", &summary(resolver)),
                Err(e) => error_reply(&e),
            },
            Err(frame) => frame,
        },
        "REMOVE_CONSTRAINT" => {
            if payload.is_empty() {
                return format_error("PARSE_ERROR", "REMOVE_CONSTRAINT requires a constraint id", "warning");
            }
            match resolver.remove_constraint(&payload.into()) {
                Ok(removed) => {
                    info!("Removed constraint {}", removed.id);
                    reply("RESOLVER_UPDATE", &summary(resolver))
                }
                Err(e) => error_reply(&e),
            }
        }
        "SOLVE" => {
            let targets = if payload.is_empty() {
                None
            } else {
                match parse::<Vec<ParameterId>>(command, payload) {
                    Ok(ids) => Some(ids.into_iter().collect::<HashSet<_>>()),
                    Err(frame) => return frame,
                }
            };
            match resolver.solve(targets.as_ref()) {
                Ok(result) => {
                    info!(
                        "Solve {}: {} in {} iterations",
                        result.solve_id, result.status, result.metrics.iterations
                    );
                    reply("SOLVE_RESULT", &result)
                }
                Err(e) => error_reply(&e),
            }
        }
        "APPLY_SOLUTION" => {
            let Some(result) = resolver.last_result().cloned() else {
                return format_error("NO_SOLUTION", "Nothing to apply; run SOLVE first", "warning");
            };
            match resolver.apply_solved_values(&result) {
                Ok(_) => reply("RESOLVER_UPDATE", &summary(resolver)),
                Err(e) => error_reply(&e),
            }
        }
        "DETECT_CONFLICTS" => reply("CONFLICT_REPORT", &resolver.detect_constraint_conflicts()),
        "AUTO_REPAIR" => {
            let conflicts = if payload.is_empty() {
                resolver.detect_constraint_conflicts().conflicts
            } else {
                match parse::<Vec<ConstraintConflict>>(command, payload) {
                    Ok(conflicts) => conflicts,
                    Err(frame) => return frame,
                }
            };
            match resolver.auto_repair_constraints(&conflicts) {
                Ok(report) => reply("REPAIR_REPORT", &report),
                Err(e) => error_reply(&e),
            }
        }
        "ANALYZE_GRAPH" => reply("GRAPH_ANALYSIS", &resolver.analyze_relation_graph()),
        "EXPORT" => reply("DOCUMENT", &resolver.to_document()),
        "IMPORT" => match ConstraintResolver::from_json(payload, config.clone()) {
            Ok(mut imported) => {
                attach_events(&mut imported, events.clone());
                *resolver = imported;
                info!(
                    "Imported document with {} parameters and {} constraints",
                    resolver.parameter_count(),
                    resolver.constraint_count()
                );
                reply("RESOLVER_UPDATE", &summary(resolver))
            }
            Err(e) => error_reply(&e),
        },
        other => {
            warn!("Unknown command: {}", other);
            format_error("UNKNOWN_COMMAND", &format!("Unknown command '{}'", other), "warning")
        }
    }
}
