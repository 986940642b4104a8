// crates/factline-ingest/src/parser.rs
// ============================================================================
// Module: Factline Tabular Parser
// Description: Stages workbook rows into entities, relationships, and hashes.
// Purpose: Provide the pure parsing half of the ingestion pipeline.
// Dependencies: factline-config, factline-core, tracing
// ============================================================================

//! ## Overview
//! The parser walks a workbook under an ingestion spec and emits staged
//! rows in sheet order, then row order. It performs no graph I/O: every
//! staged row already carries its extracted entities, relationships, and
//! both row hashes. Rows that resolve no entity are dropped; a row whose
//! key columns are null simply skips that entity (a data gap, not an
//! error).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use factline_config::ColumnMapping;
use factline_config::EntityMapping;
use factline_config::IngestionSpec;
use factline_config::RelationshipMapping;
use factline_config::SheetSpec;
use factline_config::Transform;
use factline_core::Cell;
use factline_core::ValueType;
use factline_core::hashing::compute_normalized_hash;
use factline_core::hashing::compute_raw_hash;
use tracing::warn;

use crate::workbook::Sheet;
use crate::workbook::Workbook;

// ============================================================================
// SECTION: Staged Output
// ============================================================================

/// An entity extracted from a row, ready for graph ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedEntity {
    /// Domain entity type.
    pub entity_type: String,
    /// Rendered primary key.
    pub primary_key: String,
    /// Display name; first non-null non-key property, else the key.
    pub display_name: Option<String>,
    /// Extracted properties in mapping order.
    pub properties: Vec<(String, Cell)>,
    /// Human-readable trace, `sheet:{name},row:{index}`.
    pub source_ref: String,
}

/// A relationship extracted from a row, ready for graph ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRelationship {
    /// Domain relationship type.
    pub relationship_type: String,
    /// Source endpoint entity type.
    pub from_entity_type: String,
    /// Source endpoint primary key.
    pub from_primary_key: String,
    /// Target endpoint entity type.
    pub to_entity_type: String,
    /// Target endpoint primary key.
    pub to_primary_key: String,
    /// Optional relationship properties in mapping order.
    pub properties: Option<Vec<(String, Cell)>>,
    /// Human-readable trace, `sheet:{name},row:{index}`.
    pub source_ref: String,
}

/// A parsed row with staged entities, relationships, and both hashes.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRow {
    /// Zero-based row index within its sheet.
    pub row_index: usize,
    /// Raw cell values padded to the header width.
    pub raw_values: Vec<Cell>,
    /// Entities extracted from the row.
    pub entities: Vec<StagedEntity>,
    /// Relationships extracted from the row.
    pub relationships: Vec<StagedRelationship>,
    /// SHA-256 of the canonical row serialization.
    pub raw_hash: String,
    /// SHA-256 after normalization rules.
    pub normalized_hash: String,
}

// ============================================================================
// SECTION: Cell Helpers
// ============================================================================

/// Maps trimmed header names to their zero-based column index.
///
/// Null headers are skipped; a duplicated name keeps the later column.
fn build_header_map(headers: &[Cell]) -> BTreeMap<String, usize> {
    let mut header_map = BTreeMap::new();
    for (index, header) in headers.iter().enumerate() {
        if let Some(text) = header.display_text() {
            header_map.insert(text.trim().to_string(), index);
        }
    }
    header_map
}

/// Pads or truncates a row to the header width.
fn extract_row_values(row: &[Cell], num_cols: usize) -> Vec<Cell> {
    (0 .. num_cols)
        .map(|index| row.get(index).cloned().unwrap_or(Cell::Null))
        .collect()
}

/// Shared null cell returned for missing columns.
static NULL_CELL: Cell = Cell::Null;

/// Reads a cell by header name; missing columns read as null.
fn cell_by_header<'a>(
    row_values: &'a [Cell],
    header_map: &BTreeMap<String, usize>,
    column_name: &str,
) -> &'a Cell {
    header_map
        .get(column_name)
        .and_then(|index| row_values.get(*index))
        .unwrap_or(&NULL_CELL)
}

/// Applies a column transform to a cell.
///
/// Failed numeric coercions fall back to the untransformed cell.
fn apply_transform(cell: &Cell, transform: Transform) -> Cell {
    let Some(text) = cell.display_text() else {
        return Cell::Null;
    };
    match transform {
        Transform::Strip => Cell::Text(text.trim().to_string()),
        Transform::Lower => Cell::Text(text.to_lowercase()),
        Transform::Upper => Cell::Text(text.to_uppercase()),
        Transform::Int => {
            if let Ok(int) = text.parse::<i64>() {
                Cell::Int(int)
            } else if let Ok(number) = text.parse::<f64>() {
                // Truncates toward zero.
                format!("{:.0}", number.trunc())
                    .parse::<i64>()
                    .map_or_else(|_| cell.clone(), Cell::Int)
            } else {
                cell.clone()
            }
        }
        Transform::Float => text
            .parse::<f64>()
            .map_or_else(|_| cell.clone(), Cell::Float),
    }
}

/// Reads one mapped column, applying its transform when present.
fn read_mapped_cell(
    mapping: &ColumnMapping,
    row_values: &[Cell],
    header_map: &BTreeMap<String, usize>,
) -> Cell {
    let cell = cell_by_header(row_values, header_map, &mapping.source_column);
    match mapping.transform {
        Some(transform) => apply_transform(cell, transform),
        None => cell.clone(),
    }
}

// ============================================================================
// SECTION: Key Templates
// ============================================================================

/// Renders a `{name}` key template against extracted row data.
///
/// Returns `None` when any key column is null or blank, when the
/// template references a missing or null property, or when the template
/// has unbalanced braces.
fn render_key_template(
    key_template: &str,
    key_columns: &[String],
    row_data: &BTreeMap<String, Option<String>>,
) -> Option<String> {
    for column in key_columns {
        match row_data.get(column) {
            Some(Some(value)) if !value.trim().is_empty() => {}
            _ => return None,
        }
    }

    let mut rendered = String::with_capacity(key_template.len());
    let mut rest = key_template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[.. open]);
        let after_open = &rest[open + 1 ..];
        let close = after_open.find('}')?;
        let name = &after_open[.. close];
        let value = row_data.get(name)?.as_ref()?;
        rendered.push_str(value);
        rest = &after_open[close + 1 ..];
    }
    if rest.contains('}') {
        return None;
    }
    rendered.push_str(rest);
    Some(rendered)
}

// ============================================================================
// SECTION: Entity & Relationship Extraction
// ============================================================================

/// Extracts a single entity from a row, or `None` when its key cannot
/// be resolved.
fn extract_entity(
    mapping: &EntityMapping,
    row_values: &[Cell],
    header_map: &BTreeMap<String, usize>,
    sheet_name: &str,
    row_index: usize,
) -> Option<StagedEntity> {
    let mut properties: Vec<(String, Cell)> = Vec::with_capacity(mapping.properties.len());
    let mut row_data: BTreeMap<String, Option<String>> = BTreeMap::new();
    for column in &mapping.properties {
        let cell = read_mapped_cell(column, row_values, header_map);
        row_data.insert(column.target_property.clone(), cell.display_text());
        properties.push((column.target_property.clone(), cell));
    }

    let primary_key = render_key_template(&mapping.key_template, &mapping.key_columns, &row_data)?;

    let display_name = mapping
        .properties
        .iter()
        .filter(|column| !mapping.key_columns.contains(&column.target_property))
        .find_map(|column| row_data.get(&column.target_property).cloned().flatten())
        .or_else(|| Some(primary_key.clone()));

    Some(StagedEntity {
        entity_type: mapping.entity_type.clone(),
        primary_key,
        display_name,
        properties,
        source_ref: format!("sheet:{sheet_name},row:{row_index}"),
    })
}

/// Extracts a relationship between two entities staged from the same
/// row, or `None` when either endpoint is missing.
fn extract_relationship(
    mapping: &RelationshipMapping,
    entities_by_name: &BTreeMap<&str, &StagedEntity>,
    row_values: &[Cell],
    header_map: &BTreeMap<String, usize>,
    sheet_name: &str,
    row_index: usize,
) -> Option<StagedRelationship> {
    let from_entity = entities_by_name.get(mapping.from_entity.as_str())?;
    let to_entity = entities_by_name.get(mapping.to_entity.as_str())?;

    let properties = mapping.properties.as_ref().map(|columns| {
        columns
            .iter()
            .map(|column| {
                (
                    column.target_property.clone(),
                    read_mapped_cell(column, row_values, header_map),
                )
            })
            .collect()
    });

    Some(StagedRelationship {
        relationship_type: mapping.relationship_type.clone(),
        from_entity_type: from_entity.entity_type.clone(),
        from_primary_key: from_entity.primary_key.clone(),
        to_entity_type: to_entity.entity_type.clone(),
        to_primary_key: to_entity.primary_key.clone(),
        properties,
        source_ref: format!("sheet:{sheet_name},row:{row_index}"),
    })
}

// ============================================================================
// SECTION: Sheet & Workbook Parsing
// ============================================================================

/// Parses a single sheet according to its sheet spec.
#[must_use]
pub fn parse_sheet(sheet: &Sheet, sheet_spec: &SheetSpec, spec: &IngestionSpec) -> Vec<StagedRow> {
    if sheet.rows.is_empty() {
        return Vec::new();
    }

    let Some(headers) = sheet.rows.get(sheet_spec.header_row) else {
        warn!(
            sheet = %sheet.name,
            header_row = sheet_spec.header_row,
            "header row out of range"
        );
        return Vec::new();
    };
    let header_map = build_header_map(headers);
    let num_cols = headers.len();

    let mut skip_rows: Vec<usize> = sheet_spec.skip_rows.clone();
    skip_rows.push(sheet_spec.header_row);

    // Row hashing treats every column as a string value.
    let value_types = vec![ValueType::String; num_cols];

    let mut staged_rows = Vec::new();
    for (row_index, row) in sheet.rows.iter().enumerate() {
        if skip_rows.contains(&row_index) {
            continue;
        }

        let raw_values = extract_row_values(row, num_cols);
        if raw_values.iter().all(Cell::is_null) {
            continue;
        }

        let raw_hash = compute_raw_hash(&raw_values, &spec.raw_hash_serialization);
        let normalized_hash = compute_normalized_hash(
            &raw_values,
            &spec.raw_hash_serialization,
            &spec.change_detection.normalization_rules,
            &value_types,
        );

        let mut entities = Vec::new();
        let mut entities_by_name: BTreeMap<&str, usize> = BTreeMap::new();
        for (name, entity_mapping) in &sheet_spec.entities {
            if let Some(entity) =
                extract_entity(entity_mapping, &raw_values, &header_map, &sheet.name, row_index)
            {
                entities_by_name.insert(name.as_str(), entities.len());
                entities.push(entity);
            }
        }

        let entity_refs: BTreeMap<&str, &StagedEntity> = entities_by_name
            .iter()
            .map(|(name, index)| (*name, &entities[*index]))
            .collect();

        let relationships: Vec<StagedRelationship> = sheet_spec
            .relationships
            .iter()
            .filter_map(|relationship_mapping| {
                extract_relationship(
                    relationship_mapping,
                    &entity_refs,
                    &raw_values,
                    &header_map,
                    &sheet.name,
                    row_index,
                )
            })
            .collect();

        if !entities.is_empty() {
            staged_rows.push(StagedRow {
                row_index,
                raw_values,
                entities,
                relationships,
                raw_hash,
                normalized_hash,
            });
        }
    }

    staged_rows
}

/// Parses a workbook according to the ingestion spec.
///
/// Sheets are selected by name (preferred), else index, else the first
/// sheet; missing sheets are skipped with a warning. Output order is
/// stable: sheet order, row order within each sheet.
#[must_use]
pub fn parse_workbook(workbook: &Workbook, spec: &IngestionSpec) -> Vec<StagedRow> {
    let mut all_rows = Vec::new();
    for sheet_spec in &spec.sheets {
        let sheet = if let Some(name) = &sheet_spec.sheet_name {
            let Some(found) = workbook.sheet_by_name(name) else {
                warn!(sheet = %name, "sheet not found in workbook");
                continue;
            };
            found
        } else if let Some(index) = sheet_spec.sheet_index {
            let Some(found) = workbook.sheets.get(index) else {
                warn!(sheet_index = index, "sheet index out of range");
                continue;
            };
            found
        } else {
            let Some(first) = workbook.sheets.first() else {
                continue;
            };
            first
        };

        all_rows.extend(parse_sheet(sheet, sheet_spec, spec));
    }
    all_rows
}
