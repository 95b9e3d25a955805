pub mod analysis;
pub mod config;
pub mod constraints;
pub mod document;
pub mod entities;
pub mod error;
pub mod events;
pub mod ids;
pub mod parameters;
pub mod resolver;
pub mod solver;
pub mod units;

pub use config::ResolverConfig;
pub use document::ResolverDocument;
pub use error::{ResolverError, ResolverResult, ValidationError};
pub use ids::{ConstraintId, EntityId, ParameterId};
pub use resolver::ConstraintResolver;

pub fn version() -> &'static str {
    "0.1.0"
}
