//! Serializable snapshot of a resolver.
//!
//! Lists keep registry insertion order so that tie-breaks based on
//! "first added" survive an export/import cycle.

use crate::constraints::GeometricConstraint;
use crate::entities::GeometricEntity;
use crate::parameters::GeometricParameter;
use crate::solver::ConstraintSolutionResult;
use serde::{Deserialize, Serialize};

pub const DOCUMENT_VERSION: u32 = 1;

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub parameters: Vec<GeometricParameter>,
    #[serde(default)]
    pub entities: Vec<GeometricEntity>,
    #[serde(default)]
    pub constraints: Vec<GeometricConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<ConstraintSolutionResult>,
}

impl Default for ResolverDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            parameters: Vec::new(),
            entities: Vec::new(),
            constraints: Vec::new(),
            last_result: None,
        }
    }
}

impl ResolverDocument {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
