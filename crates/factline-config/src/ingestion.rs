// crates/factline-config/src/ingestion.rs
// ============================================================================
// Module: Factline Ingestion Specs
// Description: Declarative YAML mapping from workbooks to graph mutations.
// Purpose: Tell the parser and engine how to read, map, and diff a source.
// Dependencies: factline-core, serde, serde_yaml, thiserror, tracing
// ============================================================================

//! ## Overview
//! An ingestion spec names the workspace it feeds, the sheets to read,
//! how columns map onto entities and relationships, and the dual-hash
//! settings driving change detection. Specs are loaded from
//! `{specs_dir}/{spec_name}.yaml`; files whose names start with an
//! underscore are treated as disabled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use factline_core::WorkspaceId;
use factline_core::hashing::ChangeDetection;
use factline_core::hashing::RawHashSerialization;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ingestion spec loading and validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SpecError {
    /// No spec file exists under the given name.
    #[error("ingestion spec not found: {0}")]
    NotFound(PathBuf),
    /// The spec file could not be read.
    #[error("ingestion spec io error: {0}")]
    Io(String),
    /// The spec file is not valid YAML for the spec model.
    #[error("ingestion spec parse error: {0}")]
    Parse(String),
    /// The spec parsed but failed validation.
    #[error("ingestion spec invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Column Transforms
// ============================================================================

/// Per-column transform applied before key rendering and staging.
///
/// # Invariants
/// - Wire form is the lowercase name; the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Trim surrounding whitespace.
    Strip,
    /// Lowercase the text.
    Lower,
    /// Uppercase the text.
    Upper,
    /// Coerce to an integer (through a float parse).
    Int,
    /// Coerce to a float.
    Float,
}

// ============================================================================
// SECTION: Mappings
// ============================================================================

/// Maps one source column onto one target property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Header name of the source column.
    pub source_column: String,
    /// Property key the value lands under.
    pub target_property: String,
    /// Optional transform applied to the cell.
    #[serde(default)]
    pub transform: Option<Transform>,
}

/// Maps row columns onto one entity extraction.
///
/// # Invariants
/// - `key_columns` name target properties listed in `properties`.
/// - `key_template` uses `{name}` placeholders over target properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMapping {
    /// Domain entity type produced by this mapping.
    pub entity_type: String,
    /// Target properties that must be non-null for the key to resolve.
    pub key_columns: Vec<String>,
    /// Template rendering the entity's primary key.
    pub key_template: String,
    /// Column-to-property mappings.
    pub properties: Vec<ColumnMapping>,
}

/// Maps a row onto a relationship between two extracted entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMapping {
    /// Domain relationship type.
    pub relationship_type: String,
    /// Name of the entity mapping providing the source endpoint.
    pub from_entity: String,
    /// Name of the entity mapping providing the target endpoint.
    pub to_entity: String,
    /// Optional relationship property mappings.
    #[serde(default)]
    pub properties: Option<Vec<ColumnMapping>>,
}

/// Reading and mapping rules for one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSpec {
    /// Sheet selected by name; preferred over the index.
    #[serde(default)]
    pub sheet_name: Option<String>,
    /// Sheet selected by zero-based index when no name is given.
    #[serde(default)]
    pub sheet_index: Option<usize>,
    /// Zero-based row holding the column headers.
    #[serde(default)]
    pub header_row: usize,
    /// Additional zero-based row indices to skip.
    #[serde(default)]
    pub skip_rows: Vec<usize>,
    /// Entity mappings keyed by a spec-local name.
    pub entities: std::collections::BTreeMap<String, EntityMapping>,
    /// Relationship mappings resolved against the entity names.
    #[serde(default)]
    pub relationships: Vec<RelationshipMapping>,
}

/// A complete ingestion spec document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionSpec {
    /// Spec name; also the file stem under the specs directory.
    pub spec_name: String,
    /// Spec document version.
    pub spec_version: String,
    /// Workspace the spec feeds.
    pub workspace_id: String,
    /// Source category recorded on produced assertions.
    #[serde(default = "default_source_type")]
    pub source_type: String,
    /// Optional glob restricting acceptable file names.
    #[serde(default)]
    pub file_pattern: Option<String>,
    /// Canonical serialization settings for `raw_hash`.
    #[serde(default)]
    pub raw_hash_serialization: RawHashSerialization,
    /// Change detection mode and normalization rules.
    #[serde(default)]
    pub change_detection: ChangeDetection,
    /// Sheets to read, in order.
    pub sheets: Vec<SheetSpec>,
}

/// Returns the default source type label.
fn default_source_type() -> String {
    "excel".to_string()
}

// ============================================================================
// SECTION: Validation
// ============================================================================

impl IngestionSpec {
    /// Validates spec integrity, returning all error messages found.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.spec_name.trim().is_empty() {
            errors.push("spec_name must not be empty".to_string());
        }
        if let Err(err) = WorkspaceId::new(self.workspace_id.clone()) {
            errors.push(format!("workspace_id invalid: {err}"));
        }
        if self.sheets.is_empty() {
            errors.push("spec must declare at least one sheet".to_string());
        }

        for (index, sheet) in self.sheets.iter().enumerate() {
            if sheet.entities.is_empty() {
                errors.push(format!("sheet {index}: no entity mappings declared"));
            }
            for (name, mapping) in &sheet.entities {
                if mapping.key_template.trim().is_empty() {
                    errors.push(format!("entity '{name}': key_template must not be empty"));
                }
                let targets: Vec<&str> = mapping
                    .properties
                    .iter()
                    .map(|column| column.target_property.as_str())
                    .collect();
                for key_column in &mapping.key_columns {
                    if !targets.contains(&key_column.as_str()) {
                        errors.push(format!(
                            "entity '{name}': key column '{key_column}' is not a mapped property"
                        ));
                    }
                }
            }
            for relationship in &sheet.relationships {
                if !sheet.entities.contains_key(&relationship.from_entity) {
                    errors.push(format!(
                        "relationship '{}': from_entity '{}' is not a declared entity mapping",
                        relationship.relationship_type, relationship.from_entity
                    ));
                }
                if !sheet.entities.contains_key(&relationship.to_entity) {
                    errors.push(format!(
                        "relationship '{}': to_entity '{}' is not a declared entity mapping",
                        relationship.relationship_type, relationship.to_entity
                    ));
                }
            }
        }

        errors
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Parses and validates an ingestion spec from YAML text.
///
/// # Errors
///
/// Returns [`SpecError`] when parsing or validation fails.
pub fn parse_spec(yaml: &str) -> Result<IngestionSpec, SpecError> {
    let spec: IngestionSpec =
        serde_yaml::from_str(yaml).map_err(|err| SpecError::Parse(err.to_string()))?;
    let errors = spec.validate();
    if !errors.is_empty() {
        return Err(SpecError::Invalid(errors.join("; ")));
    }
    Ok(spec)
}

/// Loads an ingestion spec from `{specs_dir}/{spec_name}.yaml`.
///
/// # Errors
///
/// Returns [`SpecError`] when the file is missing, unreadable, or fails
/// parsing or validation.
pub fn load_spec(specs_dir: &Path, spec_name: &str) -> Result<IngestionSpec, SpecError> {
    let path = specs_dir.join(format!("{spec_name}.yaml"));
    if !path.exists() {
        return Err(SpecError::NotFound(path));
    }
    let content = fs::read_to_string(&path).map_err(|err| SpecError::Io(err.to_string()))?;
    let spec = parse_spec(&content)?;
    debug!(spec_name = %spec.spec_name, path = %path.display(), "loaded ingestion spec");
    Ok(spec)
}

/// Lists available spec names (file stems) under the specs directory.
///
/// Missing directories yield an empty list; underscore-prefixed files
/// are skipped.
#[must_use]
pub fn list_specs(specs_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(specs_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "yaml") {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .filter(|stem| !stem.starts_with('_'))
                    .map(ToString::to_string)
            } else {
                None
            }
        })
        .collect();
    names.sort();
    names
}
