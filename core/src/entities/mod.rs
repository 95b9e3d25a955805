//! Entity registry.
//!
//! Entities (points, lines, arcs, surfaces, ...) group parameters and form a
//! parent/child forest used for dependency propagation. They hold read access
//! to their parameters only; the parameter registry owns the values.

pub mod types;

pub use types::{EntityType, GeometricEntity};

use crate::error::ValidationError;
use crate::ids::{EntityId, ParameterId};
use crate::parameters::ParameterRegistry;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityId, GeometricEntity>,
    order: Vec<EntityId>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, entity: &GeometricEntity, parameters: &ParameterRegistry) -> Result<(), ValidationError> {
        if entity.id.is_blank() {
            return Err(ValidationError::EmptyId { kind: "Entity" });
        }
        if self.entities.contains_key(&entity.id) {
            return Err(ValidationError::DuplicateId {
                kind: "Entity",
                id: entity.id.to_string(),
            });
        }
        for parameter in &entity.parameters {
            if !parameters.contains(parameter) {
                return Err(ValidationError::UnknownParameter {
                    owner: entity.id.to_string(),
                    parameter: parameter.clone(),
                });
            }
        }
        let linked = entity.parent.iter().chain(entity.children.iter());
        for other in linked {
            if !self.entities.contains_key(other) {
                return Err(ValidationError::UnknownEntity {
                    owner: entity.id.clone(),
                    entity: other.clone(),
                });
            }
        }
        for child in &entity.children {
            self.check_single_parent(&entity.id, child)?;
        }
        Ok(())
    }

    /// An entity has at most one parent.
    fn check_single_parent(&self, parent: &EntityId, child: &EntityId) -> Result<(), ValidationError> {
        match self.entities.get(child).and_then(|e| e.parent.as_ref()) {
            Some(existing) if existing != parent => Err(ValidationError::SecondParent {
                child: child.clone(),
                parent: existing.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Validate and insert, keeping parent/child links symmetric.
    pub fn add(&mut self, entity: GeometricEntity, parameters: &ParameterRegistry) -> Result<(), ValidationError> {
        self.validate(&entity, parameters)?;

        if let Some(parent_id) = &entity.parent {
            if let Some(parent) = self.entities.get_mut(parent_id) {
                if !parent.children.contains(&entity.id) {
                    parent.children.push(entity.id.clone());
                }
            }
        }
        for child_id in &entity.children {
            if let Some(child) = self.entities.get_mut(child_id) {
                child.parent = Some(entity.id.clone());
            }
        }

        self.order.push(entity.id.clone());
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    pub fn get(&self, id: &EntityId) -> Option<&GeometricEntity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeometricEntity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Remove an entity and unlink it from its parent and children.
    pub fn remove(&mut self, id: &EntityId) -> Option<GeometricEntity> {
        let removed = self.entities.remove(id)?;
        self.order.retain(|other| other != id);
        for entity in self.entities.values_mut() {
            entity.children.retain(|child| child != id);
            if entity.parent.as_ref() == Some(id) {
                entity.parent = None;
            }
        }
        Some(removed)
    }

    /// Attach `child` under `parent` after both have been registered.
    pub(crate) fn link(&mut self, parent: &EntityId, child: &EntityId) -> Result<(), ValidationError> {
        for id in [parent, child] {
            if !self.entities.contains_key(id) {
                return Err(ValidationError::UnknownEntity {
                    owner: child.clone(),
                    entity: id.clone(),
                });
            }
        }
        self.check_single_parent(parent, child)?;
        if let Some(entity) = self.entities.get_mut(child) {
            entity.parent = Some(parent.clone());
        }
        if let Some(entity) = self.entities.get_mut(parent) {
            if !entity.children.contains(child) {
                entity.children.push(child.clone());
            }
        }
        Ok(())
    }

    /// Entities that list the parameter among their own.
    pub fn owners_of(&self, parameter: &ParameterId) -> Vec<&GeometricEntity> {
        self.iter().filter(|e| e.parameters.contains(parameter)).collect()
    }

    /// Map from parameter to the first entity (in insertion order) that owns it.
    pub fn ownership(&self) -> HashMap<ParameterId, EntityId> {
        let mut map = HashMap::new();
        for entity in self.iter() {
            for parameter in &entity.parameters {
                map.entry(parameter.clone()).or_insert_with(|| entity.id.clone());
            }
        }
        map
    }
}
