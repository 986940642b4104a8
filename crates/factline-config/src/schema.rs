// crates/factline-config/src/schema.rs
// ============================================================================
// Module: Factline Domain Schemas
// Description: Workspace entity/relationship type definitions and registry.
// Purpose: Load, validate, and cache the YAML domain schema per workspace.
// Dependencies: regex, serde, serde_yaml, thiserror, tracing
// ============================================================================

//! ## Overview
//! A domain schema declares the entity types, their property schemas,
//! and the relationship types allowed in one workspace. The registry is
//! a read-only validator from the engine's point of view: it loads
//! schemas from disk, checks their integrity, and caches them by
//! workspace. Schema files whose names start with an underscore are
//! treated as disabled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Closed set of property type labels a schema may declare.
pub const VALID_PROPERTY_TYPES: [&str; 5] = ["string", "number", "date", "boolean", "json"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Domain schema loading and validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// No schema file matches the workspace.
    #[error("no schema found for workspace '{0}'")]
    NotFound(String),
    /// A schema file could not be read.
    #[error("schema io error: {0}")]
    Io(String),
    /// A schema file is not valid YAML for the schema model.
    #[error("schema parse error: {0}")]
    Parse(String),
    /// A schema parsed but failed validation.
    #[error("schema invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Schema Model
// ============================================================================

/// Schema of one property on an entity or relationship type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Declared type label; must be one of [`VALID_PROPERTY_TYPES`].
    #[serde(rename = "type")]
    pub property_type: String,
    /// Whether the property is required.
    #[serde(default)]
    pub required: bool,
    /// Optional regular expression constraining values.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Optional closed value set.
    #[serde(default)]
    pub r#enum: Option<Vec<String>>,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Definition of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeDef {
    /// Property acting as the natural key; must appear in `properties`.
    pub primary_key: String,
    /// Property schemas keyed by property name.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDef>,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Definition of one relationship type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipTypeDef {
    /// Source entity type; YAML may spell this `from`.
    #[serde(alias = "from")]
    pub from_type: String,
    /// Target entity type; YAML may spell this `to`.
    #[serde(alias = "to")]
    pub to_type: String,
    /// Optional relationship property schemas.
    #[serde(default)]
    pub properties: Option<BTreeMap<String, PropertyDef>>,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Alias resolution configuration for secondary natural keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasConfig {
    /// Entity type the aliases resolve to.
    pub entity_type: String,
    /// Entity type holding the alias records.
    pub alias_entity_type: String,
    /// Property on the alias entity carrying the alias value.
    pub alias_key: String,
}

/// A complete domain schema document for one workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSchema {
    /// Workspace the schema belongs to.
    pub workspace: String,
    /// Schema document version.
    pub version: String,
    /// Entity type definitions keyed by type name.
    #[serde(default)]
    pub entity_types: BTreeMap<String, EntityTypeDef>,
    /// Relationship type definitions keyed by type name.
    #[serde(default)]
    pub relationship_types: BTreeMap<String, RelationshipTypeDef>,
    /// Optional alias resolution configuration.
    #[serde(default)]
    pub alias_config: Option<AliasConfig>,
}

impl DomainSchema {
    /// Validates schema integrity, returning all error messages found.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (type_name, entity_type) in &self.entity_types {
            if !entity_type.properties.contains_key(&entity_type.primary_key) {
                errors.push(format!(
                    "entity '{type_name}': primary_key '{}' not found in properties",
                    entity_type.primary_key
                ));
            }
            for (property_name, property) in &entity_type.properties {
                validate_property(&mut errors, type_name, property_name, property);
            }
        }

        for (relationship_name, relationship) in &self.relationship_types {
            if !self.entity_types.contains_key(&relationship.from_type) {
                errors.push(format!(
                    "relationship '{relationship_name}': from_type '{}' not found in entity_types",
                    relationship.from_type
                ));
            }
            if !self.entity_types.contains_key(&relationship.to_type) {
                errors.push(format!(
                    "relationship '{relationship_name}': to_type '{}' not found in entity_types",
                    relationship.to_type
                ));
            }
            if let Some(properties) = &relationship.properties {
                for (property_name, property) in properties {
                    validate_property(&mut errors, relationship_name, property_name, property);
                }
            }
        }

        errors
    }
}

/// Validates one property definition into the shared error list.
fn validate_property(
    errors: &mut Vec<String>,
    owner: &str,
    property_name: &str,
    property: &PropertyDef,
) {
    if !VALID_PROPERTY_TYPES.contains(&property.property_type.as_str()) {
        errors.push(format!(
            "'{owner}'.{property_name}: invalid type '{}'; must be one of {}",
            property.property_type,
            VALID_PROPERTY_TYPES.join(", ")
        ));
    }
    if let Some(pattern) = &property.pattern
        && let Err(err) = Regex::new(pattern)
    {
        errors.push(format!(
            "'{owner}'.{property_name}: invalid regex pattern '{pattern}': {err}"
        ));
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Loads, validates, and caches domain schemas by workspace.
///
/// # Invariants
/// - Cached schemas have always passed validation.
#[derive(Debug)]
pub struct SchemaRegistry {
    /// Validated schemas keyed by workspace.
    schemas: Mutex<BTreeMap<String, DomainSchema>>,
    /// Directory scanned for schema YAML files.
    schemas_dir: PathBuf,
}

impl SchemaRegistry {
    /// Creates a registry over the given schema directory.
    #[must_use]
    pub fn new(schemas_dir: impl Into<PathBuf>) -> Self {
        Self {
            schemas: Mutex::new(BTreeMap::new()),
            schemas_dir: schemas_dir.into(),
        }
    }

    /// Parses and validates a schema from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when parsing or validation fails.
    pub fn load_schema_from_yaml(&self, yaml: &str) -> Result<DomainSchema, SchemaError> {
        let schema: DomainSchema =
            serde_yaml::from_str(yaml).map_err(|err| SchemaError::Parse(err.to_string()))?;
        let errors = schema.validate();
        if !errors.is_empty() {
            return Err(SchemaError::Invalid(errors.join("; ")));
        }
        Ok(schema)
    }

    /// Loads the schema for a workspace from disk, caching it.
    ///
    /// Scans `*.yaml` / `*.yml` files under the schema directory for a
    /// document whose `workspace` field matches.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when no matching file exists or the match
    /// fails validation.
    pub fn load_schema(&self, workspace_id: &str) -> Result<DomainSchema, SchemaError> {
        let entries =
            fs::read_dir(&self.schemas_dir).map_err(|err| SchemaError::Io(err.to_string()))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml")
                    && !path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.starts_with('_'))
            })
            .collect();
        paths.sort();

        for path in paths {
            let Ok(content) = fs::read_to_string(&path) else {
                warn!(path = %path.display(), "unreadable schema file skipped");
                continue;
            };
            let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(&content) else {
                continue;
            };
            if value.get("workspace").and_then(serde_yaml::Value::as_str) != Some(workspace_id) {
                continue;
            }
            let schema = self.load_schema_from_yaml(&content)?;
            info!(workspace = workspace_id, path = %path.display(), "loaded domain schema");
            if let Ok(mut cache) = self.schemas.lock() {
                cache.insert(workspace_id.to_string(), schema.clone());
            }
            return Ok(schema);
        }

        Err(SchemaError::NotFound(workspace_id.to_string()))
    }

    /// Returns the cached schema or loads it from disk.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the schema must be loaded and loading
    /// fails.
    pub fn get_schema(&self, workspace_id: &str) -> Result<DomainSchema, SchemaError> {
        if let Ok(cache) = self.schemas.lock()
            && let Some(schema) = cache.get(workspace_id)
        {
            return Ok(schema.clone());
        }
        self.load_schema(workspace_id)
    }

    /// Registers a schema directly, validating it first.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when validation fails.
    pub fn register_schema(&self, schema: DomainSchema) -> Result<(), SchemaError> {
        let errors = schema.validate();
        if !errors.is_empty() {
            return Err(SchemaError::Invalid(errors.join("; ")));
        }
        if let Ok(mut cache) = self.schemas.lock() {
            cache.insert(schema.workspace.clone(), schema);
        }
        Ok(())
    }

    /// Lists workspace identifiers with a cached or on-disk schema.
    #[must_use]
    pub fn list_schemas(&self) -> Vec<String> {
        let mut workspaces: Vec<String> = self
            .schemas
            .lock()
            .map(|cache| cache.keys().cloned().collect())
            .unwrap_or_default();

        if let Ok(entries) = fs::read_dir(&self.schemas_dir) {
            for entry in entries.filter_map(Result::ok) {
                let path = entry.path();
                if !path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml") {
                    continue;
                }
                if path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with('_'))
                {
                    continue;
                }
                let Ok(content) = fs::read_to_string(&path) else {
                    continue;
                };
                if let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(&content)
                    && let Some(workspace) =
                        value.get("workspace").and_then(serde_yaml::Value::as_str)
                    && !workspaces.iter().any(|existing| existing == workspace)
                {
                    workspaces.push(workspace.to_string());
                }
            }
        }

        workspaces.sort();
        workspaces
    }
}
