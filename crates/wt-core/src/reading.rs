//! Sample ingestion: converting raw scale values into canonical readings.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Grams per kilogram.
const GRAMS_PER_KG: f64 = 1000.0;

/// Errors produced while normalizing a raw sample.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReadingError {
    /// The value was NaN or infinite and cannot take part in arithmetic.
    #[error("weight must be a finite number, got {value}")]
    NonFinite { value: f64 },
}

/// Unit reported by the scale alongside a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Kg,
    #[serde(rename = "g")]
    Grams,
}

impl Unit {
    /// Parses the unit string sent by the scale.
    ///
    /// Only `"kg"` is recognized as kilograms; every other string is treated
    /// as grams.
    #[must_use]
    pub fn from_unit_str(s: &str) -> Self {
        if s == "kg" { Self::Kg } else { Self::Grams }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kg => "kg",
            Self::Grams => "g",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized weight observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Weight in kilograms. May be negative (tare drift); never NaN.
    pub weight_kg: f64,

    /// Local wall-clock time the sample arrived.
    pub received_at: NaiveDateTime,
}

/// Converts a raw `(value, unit)` pair into a [`Reading`] in kilograms.
pub fn normalize(
    raw_value: f64,
    unit: Unit,
    received_at: NaiveDateTime,
) -> Result<Reading, ReadingError> {
    if !raw_value.is_finite() {
        return Err(ReadingError::NonFinite { value: raw_value });
    }

    let weight_kg = match unit {
        Unit::Kg => raw_value,
        Unit::Grams => raw_value / GRAMS_PER_KG,
    };

    Ok(Reading {
        weight_kg,
        received_at,
    })
}
