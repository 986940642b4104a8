// crates/factline-core/src/hashing.rs
// ============================================================================
// Module: Factline Hash Engine
// Description: Canonical row serialization, dual SHA-256 fingerprints, and
//              assertion-key builders.
// Purpose: Provide the frozen change-detection contract for ingestion.
// Dependencies: serde, sha2, time, crate::core
// ============================================================================

//! ## Overview
//! Every staged row and every property value receives two fingerprints:
//!
//! - `raw_hash`: SHA-256 of the delimiter-joined canonical serialization
//!   of the cells in declared column order;
//! - `normalized_hash`: SHA-256 of the same serialization after the
//!   normalization rules ran per cell.
//!
//! Both hashes are always computed and stored. The change-detection mode
//! only selects which one drives diffing, never which one is persisted.
//! The serialization and normalization rules here are a frozen contract:
//! hashes must stay stable across releases, platforms, and locales.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use time::Date;
use time::PrimitiveDateTime;
use time::format_description;

use crate::core::cell::Cell;
use crate::core::cell::ValueType;

// ============================================================================
// SECTION: Serialization Settings
// ============================================================================

/// Cell ordering applied during canonical serialization.
///
/// # Invariants
/// - Wire form is the lowercase name; the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CellOrder {
    /// Declared column order of the source sheet.
    #[default]
    ColumnOrder,
}

/// Rendering applied to parsed numbers and dates during serialization.
///
/// # Invariants
/// - Wire form is the lowercase name; the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayFormat {
    /// String coercion of the parsed value.
    #[default]
    AsDisplayed,
}

/// Canonical serialization settings for `raw_hash`.
///
/// # Invariants
/// - Changing any field changes every hash computed under the spec;
///   persisted hashes are never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHashSerialization {
    /// Cell ordering rule.
    #[serde(default)]
    pub cell_order: CellOrder,
    /// Delimiter joining serialized cells.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Replacement text for null cells.
    #[serde(default = "default_null_representation")]
    pub null_representation: String,
    /// Rendering rule for numeric cells.
    #[serde(default)]
    pub number_format: DisplayFormat,
    /// Rendering rule for date cells.
    #[serde(default)]
    pub date_format: DisplayFormat,
    /// Whether cell formatting participates in the hash.
    #[serde(default)]
    pub include_formatting: bool,
}

impl Default for RawHashSerialization {
    fn default() -> Self {
        Self {
            cell_order: CellOrder::ColumnOrder,
            delimiter: default_delimiter(),
            null_representation: default_null_representation(),
            number_format: DisplayFormat::AsDisplayed,
            date_format: DisplayFormat::AsDisplayed,
            include_formatting: false,
        }
    }
}

/// Returns the default cell delimiter.
fn default_delimiter() -> String {
    "|".to_string()
}

/// Returns the default null replacement text.
fn default_null_representation() -> String {
    "<NULL>".to_string()
}

// ============================================================================
// SECTION: Normalization Settings
// ============================================================================

/// Fixed-decimal formatting applied to numeric cells during
/// normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NumberNormalization {
    /// Number of decimal places to render.
    #[serde(default)]
    pub decimal_places: Option<usize>,
}

/// Per-cell normalization rules for `normalized_hash`.
///
/// # Invariants
/// - Null patterns match the untrimmed cell text exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRules {
    /// Trim surrounding whitespace.
    #[serde(default = "default_true")]
    pub trim_whitespace: bool,
    /// Lowercase cells whose declared type is `string`.
    #[serde(default = "default_true")]
    pub lowercase_strings: bool,
    /// Cell texts treated as null.
    #[serde(default = "default_null_patterns")]
    pub normalize_nulls: Vec<String>,
    /// Fixed-decimal formatting for `number` cells.
    #[serde(default)]
    pub number_format: Option<NumberNormalization>,
    /// Target format for `date` cells, e.g. `YYYY-MM-DD`.
    #[serde(default)]
    pub date_format: Option<String>,
}

impl Default for NormalizationRules {
    fn default() -> Self {
        Self {
            trim_whitespace: true,
            lowercase_strings: true,
            normalize_nulls: default_null_patterns(),
            number_format: None,
            date_format: None,
        }
    }
}

/// Returns true; serde default helper.
const fn default_true() -> bool {
    true
}

/// Returns the default null pattern list.
fn default_null_patterns() -> Vec<String> {
    vec![
        String::new(),
        "N/A".to_string(),
        "n/a".to_string(),
        "null".to_string(),
        "-".to_string(),
    ]
}

/// Hash selected to drive change detection.
///
/// # Invariants
/// - Wire form is the lowercase name; the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetectionMode {
    /// Compare `raw_hash`; any byte-level difference counts as a change.
    Strict,
    /// Compare `normalized_hash`; semantic differences only.
    #[default]
    Normalized,
}

/// Change-detection configuration of an ingestion spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChangeDetection {
    /// Hash driving the diff.
    #[serde(default)]
    pub mode: ChangeDetectionMode,
    /// Normalization rules feeding `normalized_hash`.
    #[serde(default)]
    pub normalization_rules: NormalizationRules,
}

// ============================================================================
// SECTION: Canonical Serialization
// ============================================================================

/// Serializes one cell to its canonical text.
fn serialize_cell(cell: &Cell, spec: &RawHashSerialization) -> String {
    cell.display_text()
        .unwrap_or_else(|| spec.null_representation.clone())
}

/// Lowercase hex SHA-256 of the input text as UTF-8.
fn sha256_hex(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Computes `raw_hash` over a row of cells.
///
/// The canonical serialization joins each cell's canonical text with the
/// configured delimiter in declared column order.
#[must_use]
pub fn compute_raw_hash(cells: &[Cell], spec: &RawHashSerialization) -> String {
    let canonical = cells
        .iter()
        .map(|cell| serialize_cell(cell, spec))
        .collect::<Vec<_>>()
        .join(&spec.delimiter);
    sha256_hex(&canonical)
}

/// Computes `raw_hash` for a single value.
///
/// Defined as the row hash of the one-element row.
#[must_use]
pub fn compute_property_raw_hash(value: &Cell, spec: &RawHashSerialization) -> String {
    compute_raw_hash(std::slice::from_ref(value), spec)
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Accepted input formats for date normalization, tried in order.
const DATE_INPUT_FORMATS: [&str; 3] = [
    "[year]-[month]-[day]",
    "[month]/[day]/[year]",
    "[day]/[month]/[year]",
];

/// Accepted date-time input formats, tried after the date formats.
const DATETIME_INPUT_FORMATS: [&str; 2] = [
    "[year]-[month]-[day]T[hour]:[minute]:[second]",
    "[year]-[month]-[day] [hour]:[minute]:[second]",
];

/// Attempts to parse a date from the accepted input formats.
fn parse_date_lenient(text: &str) -> Option<Date> {
    for format in DATE_INPUT_FORMATS {
        if let Ok(items) = format_description::parse(format)
            && let Ok(date) = Date::parse(text, &items)
        {
            return Some(date);
        }
    }
    for format in DATETIME_INPUT_FORMATS {
        if let Ok(items) = format_description::parse(format)
            && let Ok(datetime) = PrimitiveDateTime::parse(text, &items)
        {
            return Some(datetime.date());
        }
    }
    None
}

/// Reformats a parsed date against a `YYYY-MM-DD`-style target format.
fn reformat_date(date: Date, target: &str) -> Option<String> {
    let translated = target
        .replace("YYYY", "[year]")
        .replace("MM", "[month]")
        .replace("DD", "[day]");
    let items = format_description::parse(&translated).ok()?;
    date.format(&items).ok()
}

/// Applies the normalization rules to one cell, producing the normalized
/// text that feeds `normalized_hash`.
fn normalize_cell(cell: &Cell, rules: &NormalizationRules, value_type: ValueType) -> String {
    let Some(mut text) = cell.display_text() else {
        return String::new();
    };

    // Null patterns match before trimming.
    if rules.normalize_nulls.iter().any(|p| *p == text) {
        text = String::new();
    }

    if rules.trim_whitespace {
        text = text.trim().to_string();
    }

    if rules.lowercase_strings && value_type == ValueType::String {
        text = text.to_lowercase();
    }

    if value_type == ValueType::Number
        && let Some(number_format) = &rules.number_format
        && let Some(places) = number_format.decimal_places
        && let Ok(number) = text.parse::<f64>()
    {
        text = format!("{number:.places$}");
    }

    if value_type == ValueType::Date
        && let Some(target) = &rules.date_format
        && let Some(date) = parse_date_lenient(&text)
        && let Some(reformatted) = reformat_date(date, target)
    {
        text = reformatted;
    }

    text
}

/// Computes `normalized_hash` over a row of cells.
///
/// Cells beyond the end of `value_types` are treated as `string`. The
/// delimiter comes from the same serialization spec as `raw_hash`.
#[must_use]
pub fn compute_normalized_hash(
    cells: &[Cell],
    spec: &RawHashSerialization,
    rules: &NormalizationRules,
    value_types: &[ValueType],
) -> String {
    let canonical = cells
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            let value_type = value_types.get(index).copied().unwrap_or_default();
            normalize_cell(cell, rules, value_type)
        })
        .collect::<Vec<_>>()
        .join(&spec.delimiter);
    sha256_hex(&canonical)
}

/// Computes `normalized_hash` for a single value.
#[must_use]
pub fn compute_property_normalized_hash(
    value: &Cell,
    spec: &RawHashSerialization,
    rules: &NormalizationRules,
    value_type: ValueType,
) -> String {
    compute_normalized_hash(std::slice::from_ref(value), spec, rules, &[value_type])
}

// ============================================================================
// SECTION: Assertion Keys
// ============================================================================

/// Builds the assertion key for a property claim.
///
/// Format: `{wid}:{entity_type}:{primary_key}:prop:{property_key}`.
#[must_use]
pub fn property_assertion_key(
    workspace_id: &str,
    entity_type: &str,
    primary_key: &str,
    property_key: &str,
) -> String {
    format!("{workspace_id}:{entity_type}:{primary_key}:prop:{property_key}")
}

/// Builds the assertion key for a relationship claim.
///
/// Format:
/// `{wid}:{etype_from}:{pk_from}:{rel_type}:{etype_to}:{pk_to}`.
#[must_use]
pub fn relationship_assertion_key(
    workspace_id: &str,
    entity_type_from: &str,
    primary_key_from: &str,
    relationship_type: &str,
    entity_type_to: &str,
    primary_key_to: &str,
) -> String {
    format!(
        "{workspace_id}:{entity_type_from}:{primary_key_from}:{relationship_type}:{entity_type_to}:{primary_key_to}"
    )
}
