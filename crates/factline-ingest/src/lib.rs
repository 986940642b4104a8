// crates/factline-ingest/src/lib.rs
// ============================================================================
// Module: Factline Ingest
// Description: Workbook model, tabular parser, and ingestion engine.
// Purpose: Turn tabular sources into idempotent graph mutations.
// Dependencies: factline-config, factline-core, serde, serde_json,
//               thiserror, time, tracing
// ============================================================================

//! ## Overview
//! The ingestion pipeline is a deterministic transform: a workbook plus
//! a declarative ingestion spec become a batch of graph mutations under
//! one import run. The [`parser`] stages rows without any graph I/O;
//! the [`engine`] upserts entities, diffs assertions with dual-hash
//! change detection, detects disappearances across runs, and emits one
//! change event per run. The [`view`] module assembles resolved and
//! all-claims entity views for the query surface.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod engine;
pub mod parser;
pub mod view;
pub mod workbook;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use engine::CancelToken;
pub use engine::ImportResult;
pub use engine::ImportStats;
pub use engine::IngestionEngine;
pub use engine::WorkbookInput;
pub use parser::StagedEntity;
pub use parser::StagedRelationship;
pub use parser::StagedRow;
pub use parser::parse_workbook;
pub use view::EntityView;
pub use view::PropertyView;
pub use view::RelationshipView;
pub use view::ViewMode;
pub use view::entity_view;
pub use workbook::Sheet;
pub use workbook::Workbook;
pub use workbook::WorkbookError;
