//! Core types for geometric parameters.

use crate::ids::ParameterId;
use crate::units::Unit;
use serde::{Deserialize, Serialize};

/// Semantic role of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterType {
    Length,
    Angle,
    Coordinate,
    Radius,
    Ratio,
}

impl ParameterType {
    pub fn default_unit(&self) -> Unit {
        match self {
            Self::Length | Self::Coordinate | Self::Radius => Unit::millimeters(),
            Self::Angle => Unit::degrees(),
            Self::Ratio => Unit::Dimensionless,
        }
    }
}

/// Closed interval a parameter value must stay within.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Convert both ends into base units.
    pub fn to_base(&self, unit: &Unit) -> Self {
        Self {
            min: unit.to_base(self.min),
            max: unit.to_base(self.max),
        }
    }
}

/// A named scalar that constraints relate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometricParameter {
    pub id: ParameterId,
    pub parameter_type: ParameterType,
    /// Current value in the parameter's own unit.
    pub value: f64,
    pub unit: Unit,
    pub bounds: Bounds,
    /// Decimal places used when reporting solved values.
    #[serde(default = "default_precision")]
    pub precision: u32,
    #[serde(default)]
    pub description: String,
}

fn default_precision() -> u32 {
    6
}

impl GeometricParameter {
    pub fn new(id: impl Into<ParameterId>, parameter_type: ParameterType, value: f64, bounds: Bounds) -> Self {
        Self {
            id: id.into(),
            parameter_type,
            value,
            unit: parameter_type.default_unit(),
            bounds,
            precision: default_precision(),
            description: String::new(),
        }
    }

    /// A coordinate in millimetres, bounded to +/- 1e6.
    pub fn coordinate(id: impl Into<ParameterId>, value: f64) -> Self {
        Self::new(id, ParameterType::Coordinate, value, Bounds::new(-1.0e6, 1.0e6))
    }

    /// A non-negative length in millimetres.
    pub fn length(id: impl Into<ParameterId>, value: f64) -> Self {
        Self::new(id, ParameterType::Length, value, Bounds::new(0.0, 1.0e6))
    }

    /// A non-negative radius in millimetres.
    pub fn radius(id: impl Into<ParameterId>, value: f64) -> Self {
        Self::new(id, ParameterType::Radius, value, Bounds::new(0.0, 1.0e6))
    }

    /// An angle in degrees within one full turn either way.
    pub fn angle(id: impl Into<ParameterId>, degrees: f64) -> Self {
        Self::new(id, ParameterType::Angle, degrees, Bounds::new(-360.0, 360.0))
    }

    pub fn ratio(id: impl Into<ParameterId>, value: f64) -> Self {
        Self::new(id, ParameterType::Ratio, value, Bounds::new(0.0, 1.0))
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = Bounds::new(min, max);
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn base_value(&self) -> f64 {
        self.unit.to_base(self.value)
    }

    pub fn base_bounds(&self) -> Bounds {
        self.bounds.to_base(&self.unit)
    }

    /// Round a value (in this parameter's unit) to its reporting precision.
    pub fn round(&self, value: f64) -> f64 {
        let scale = 10f64.powi(self.precision.min(15) as i32);
        (value * scale).round() / scale
    }
}
