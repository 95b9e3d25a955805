//! Strongly typed identifiers for parameters, constraints and entities.
//!
//! Ids are caller-chosen strings (e.g. `"p1.x"`, `"dist_ab"`) so that documents
//! stay readable when exported. Anonymous ids can be generated from a random UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random id, e.g. `param-5f0c...`.
            pub fn generate() -> Self {
                Self(format!("{}-{}", $prefix, Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the id is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a [`GeometricParameter`](crate::parameters::GeometricParameter).
    ParameterId,
    "param"
);

string_id!(
    /// Identifier of a [`GeometricConstraint`](crate::constraints::GeometricConstraint).
    ConstraintId,
    "constraint"
);

string_id!(
    /// Identifier of a [`GeometricEntity`](crate::entities::GeometricEntity).
    EntityId,
    "entity"
);
