//! Units attached to geometric parameters.
//!
//! The solver works in base units (millimetres for lengths, radians for
//! angles) so that constraints mixing parameters of different units stay
//! consistent. Values are converted back into each parameter's own unit
//! when reported.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Length,
    Angle,
    Dimensionless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LengthUnit {
    #[default]
    Millimeter,
    Centimeter,
    Meter,
    Inch,
    Foot,
}

impl LengthUnit {
    pub fn to_mm(&self, value: f64) -> f64 {
        value * self.mm_per_unit()
    }

    pub fn from_mm(&self, mm: f64) -> f64 {
        mm / self.mm_per_unit()
    }

    fn mm_per_unit(&self) -> f64 {
        match self {
            Self::Millimeter => 1.0,
            Self::Centimeter => 10.0,
            Self::Meter => 1000.0,
            Self::Inch => 25.4,
            Self::Foot => 304.8,
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millimeter => write!(f, "mm"),
            Self::Centimeter => write!(f, "cm"),
            Self::Meter => write!(f, "m"),
            Self::Inch => write!(f, "in"),
            Self::Foot => write!(f, "ft"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AngleUnit {
    #[default]
    Degrees,
    Radians,
}

impl AngleUnit {
    pub fn to_radians(&self, value: f64) -> f64 {
        match self {
            Self::Degrees => value.to_radians(),
            Self::Radians => value,
        }
    }

    pub fn from_radians(&self, radians: f64) -> f64 {
        match self {
            Self::Degrees => radians.to_degrees(),
            Self::Radians => radians,
        }
    }
}

impl fmt::Display for AngleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Degrees => write!(f, "deg"),
            Self::Radians => write!(f, "rad"),
        }
    }
}

/// Unit of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Unit {
    #[default]
    Dimensionless,
    Length(LengthUnit),
    Angle(AngleUnit),
}

impl Unit {
    pub fn millimeters() -> Self {
        Self::Length(LengthUnit::Millimeter)
    }

    pub fn degrees() -> Self {
        Self::Angle(AngleUnit::Degrees)
    }

    pub fn radians() -> Self {
        Self::Angle(AngleUnit::Radians)
    }

    pub fn dimension(&self) -> Dimension {
        match self {
            Self::Dimensionless => Dimension::Dimensionless,
            Self::Length(_) => Dimension::Length,
            Self::Angle(_) => Dimension::Angle,
        }
    }

    /// Convert a value to base units (mm for length, radians for angle).
    pub fn to_base(&self, value: f64) -> f64 {
        match self {
            Self::Dimensionless => value,
            Self::Length(lu) => lu.to_mm(value),
            Self::Angle(au) => au.to_radians(value),
        }
    }

    /// Convert a value from base units into this unit.
    pub fn from_base(&self, base_value: f64) -> f64 {
        match self {
            Self::Dimensionless => base_value,
            Self::Length(lu) => lu.from_mm(base_value),
            Self::Angle(au) => au.from_radians(base_value),
        }
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.dimension() == other.dimension()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dimensionless => write!(f, ""),
            Self::Length(lu) => write!(f, "{}", lu),
            Self::Angle(au) => write!(f, "{}", au),
        }
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "-" => Ok(Self::Dimensionless),
            "mm" => Ok(Self::Length(LengthUnit::Millimeter)),
            "cm" => Ok(Self::Length(LengthUnit::Centimeter)),
            "m" => Ok(Self::Length(LengthUnit::Meter)),
            "in" => Ok(Self::Length(LengthUnit::Inch)),
            "ft" => Ok(Self::Length(LengthUnit::Foot)),
            "deg" | "°" => Ok(Self::Angle(AngleUnit::Degrees)),
            "rad" => Ok(Self::Angle(AngleUnit::Radians)),
            other => Err(format!("Unknown unit '{}'", other)),
        }
    }
}
