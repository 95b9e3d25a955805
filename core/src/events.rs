//! Domain events raised by resolver mutations.
//!
//! Observers are plain callbacks owned by the resolver and invoked
//! synchronously, in registration order, before the mutating call returns.

use crate::ids::{ConstraintId, EntityId, ParameterId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResolverEvent {
    ParameterCreated { id: ParameterId },
    ParameterRemoved { id: ParameterId },
    EntityCreated { id: EntityId },
    EntityRemoved { id: EntityId },
    ConstraintCreated { id: ConstraintId },
    ConstraintRemoved { id: ConstraintId },
    ConstraintModified { id: ConstraintId },
    /// The constraint switched between driving and reference
    ConstraintDrivingChanged { id: ConstraintId, driving: bool },
    /// Solved values were written back into the parameter registry
    ValuesApplied { solve_id: Uuid, count: usize },
}

pub type Observer = Box<dyn FnMut(&ResolverEvent) + Send>;

#[derive(Default)]
pub struct EventBus {
    observers: Vec<Observer>,
}

impl EventBus {
    pub fn subscribe(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    pub fn emit(&mut self, event: ResolverEvent) {
        for observer in self.observers.iter_mut() {
            observer(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}
