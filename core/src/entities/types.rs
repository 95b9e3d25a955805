use crate::ids::{EntityId, ParameterId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Point,
    Line,
    Circle,
    Arc,
    Surface,
    Volume,
    Other(String),
}

impl EntityType {
    /// Degrees of freedom of the bare geometry when the entity owns no parameters.
    pub fn default_dof(&self) -> usize {
        match self {
            Self::Point => 2,  // x, y
            Self::Line => 4,   // start_x, start_y, end_x, end_y
            Self::Circle => 3, // center_x, center_y, radius
            Self::Arc => 5,    // center_x, center_y, radius, start_angle, end_angle
            Self::Surface => 6,
            Self::Volume => 9,
            Self::Other(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometricEntity {
    pub id: EntityId,
    pub entity_type: EntityType,
    /// Parameters this entity reads; ownership stays with the parameter registry.
    #[serde(default)]
    pub parameters: Vec<ParameterId>,
    #[serde(default)]
    pub parent: Option<EntityId>,
    #[serde(default)]
    pub children: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

impl GeometricEntity {
    pub fn new(id: impl Into<EntityId>, entity_type: EntityType, parameters: Vec<ParameterId>) -> Self {
        Self {
            id: id.into(),
            entity_type,
            parameters,
            parent: None,
            children: Vec::new(),
            layer: None,
        }
    }

    pub fn point(id: impl Into<EntityId>, x: impl Into<ParameterId>, y: impl Into<ParameterId>) -> Self {
        Self::new(id, EntityType::Point, vec![x.into(), y.into()])
    }

    pub fn with_parent(mut self, parent: impl Into<EntityId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_layer(mut self, layer: &str) -> Self {
        self.layer = Some(layer.to_string());
        self
    }

    pub fn degrees_of_freedom(&self) -> usize {
        if self.parameters.is_empty() {
            self.entity_type.default_dof()
        } else {
            self.parameters.len()
        }
    }
}
