// crates/factline-config/src/lib.rs
// ============================================================================
// Module: Factline Config
// Description: Declarative ingestion specs, domain schemas, and settings.
// Purpose: Parse and validate the YAML configuration surface of Factline.
// Dependencies: factline-core, regex, serde, serde_yaml, thiserror, tracing
// ============================================================================

//! ## Overview
//! Three configuration surfaces live here:
//!
//! - [`IngestionSpec`]: the declarative mapping from a workbook to
//!   entities, relationships, and hash settings;
//! - [`DomainSchema`]: the workspace's entity/relationship type
//!   definitions, loaded through the [`SchemaRegistry`];
//! - [`Settings`]: environment-derived backend endpoints and on-disk
//!   directories.
//!
//! Loaders validate eagerly and return typed errors; nothing here touches
//! the graph store.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod ingestion;
pub mod schema;
pub mod settings;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use ingestion::ColumnMapping;
pub use ingestion::EntityMapping;
pub use ingestion::IngestionSpec;
pub use ingestion::RelationshipMapping;
pub use ingestion::SheetSpec;
pub use ingestion::SpecError;
pub use ingestion::Transform;
pub use ingestion::list_specs;
pub use ingestion::load_spec;
pub use schema::AliasConfig;
pub use schema::DomainSchema;
pub use schema::EntityTypeDef;
pub use schema::PropertyDef;
pub use schema::RelationshipTypeDef;
pub use schema::SchemaError;
pub use schema::SchemaRegistry;
pub use settings::Settings;
pub use settings::SettingsError;
