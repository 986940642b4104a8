// crates/factline-core/src/core/cell.rs
// ============================================================================
// Module: Factline Cell Model
// Description: Dynamic tabular cell values and declared value types.
// Purpose: Carry source cells through parsing, hashing, and persistence.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Source cells arrive as an open sum of null, boolean, integer, float,
//! date, and text values. [`Cell`] models that sum as a tagged variant;
//! canonical serialization and normalization dispatch on the tag. The
//! JSON codec maps scalars to the obvious variants and represents dates
//! as `{"date": "YYYY-MM-DD"}` objects so they survive round-trips.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Error as DeError;
use serde::de::MapAccess;
use serde::de::Visitor;
use serde::ser::SerializeMap;
use time::Date;
use time::macros::format_description;

// ============================================================================
// SECTION: Value Types
// ============================================================================

/// Declared value type of a property, as stored on `PropertyValue`
/// vertices and used by normalization rules.
///
/// # Invariants
/// - Wire form is the lowercase name; the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Free-form text.
    #[default]
    String,
    /// Integer or floating point number.
    Number,
    /// Calendar date or date-time.
    Date,
    /// Boolean flag.
    Boolean,
    /// Opaque JSON payload.
    Json,
}

impl ValueType {
    /// Returns the stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Json => "json",
        }
    }

    /// Parses a lowercase label back into a value type.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "boolean" => Some(Self::Boolean),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Cell
// ============================================================================

/// A single tabular cell value.
///
/// # Invariants
/// - `Float` never holds NaN or infinities when produced by the parser;
///   hashing renders whatever it is handed deterministically.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Empty cell.
    Null,
    /// Boolean cell.
    Bool(bool),
    /// Integer cell.
    Int(i64),
    /// Floating point cell.
    Float(f64),
    /// Calendar date cell.
    Date(Date),
    /// Text cell.
    Text(String),
}

impl Cell {
    /// Returns true when the cell is [`Cell::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the display text of the cell, or `None` for a null cell.
    ///
    /// Booleans render lowercase, integers and floats in their shortest
    /// decimal form, and dates as ISO `YYYY-MM-DD`.
    #[must_use]
    pub fn display_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Date(d) => Some(format_date_iso(*d)),
            Self::Text(t) => Some(t.clone()),
        }
    }

    /// Infers the stored [`ValueType`] for the cell.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Boolean,
            Self::Int(_) | Self::Float(_) => ValueType::Number,
            Self::Date(_) => ValueType::Date,
            Self::Null | Self::Text(_) => ValueType::String,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Renders a date as ISO `YYYY-MM-DD`.
#[must_use]
pub fn format_date_iso(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

// ============================================================================
// SECTION: JSON Codec
// ============================================================================

impl Serialize for Cell {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Date(d) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("date", &format_date_iso(*d))?;
                map.end()
            }
            Self::Text(t) => serializer.serialize_str(t),
        }
    }
}

/// Visitor mapping JSON scalars onto [`Cell`] variants.
struct CellVisitor;

impl<'de> Visitor<'de> for CellVisitor {
    type Value = Cell;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("null, bool, number, string, or {\"date\": \"YYYY-MM-DD\"}")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        Ok(Cell::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        Ok(Cell::Null)
    }

    fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        Ok(Cell::Bool(value))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        Ok(Cell::Int(value))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        i64::try_from(value)
            .map(Cell::Int)
            .map_err(|_| E::custom("integer cell out of range"))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        Ok(Cell::Float(value))
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        Ok(Cell::Text(value.to_string()))
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        Ok(Cell::Text(value))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let Some((key, value)) = map.next_entry::<String, String>()? else {
            return Err(DeError::custom("expected a {\"date\": ...} object"));
        };
        if key != "date" {
            return Err(DeError::custom(format!("unexpected cell object key: {key}")));
        }
        let date = Date::parse(&value, format_description!("[year]-[month]-[day]"))
            .map_err(|err| DeError::custom(format!("invalid date cell '{value}': {err}")))?;
        Ok(Cell::Date(date))
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(CellVisitor)
    }
}
