// crates/factline-core/src/lib.rs
// ============================================================================
// Module: Factline Core
// Description: Data model, hash engine, resolved view, and storage port.
// Purpose: Provide the backend-agnostic heart of the Factline knowledge graph.
// Dependencies: rand, serde, serde_json, sha2, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! Factline turns tabular sources into an append-only, workspace-scoped
//! graph of entities and assertions. This crate holds everything that is
//! independent of any particular graph backend or transport:
//!
//! - typed identifiers and the time-sortable identifier generator;
//! - the clock abstraction (the engine never reads wall-clock time
//!   directly);
//! - the dynamic cell model for tabular values;
//! - the vertex record types (`Entity`, `AssertionRecord`,
//!   `PropertyValue`, `ChangeEvent`, `ImportRun`, `Source`);
//! - the dual-hash engine and assertion-key builders;
//! - the resolved-view engine that picks one winner per assertion key;
//! - the [`GraphPort`] trait every storage driver implements.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod hashing;
pub mod interfaces;
pub mod resolve;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::core::cell::Cell;
pub use crate::core::cell::ValueType;
pub use crate::core::identifiers::AssertionId;
pub use crate::core::identifiers::ChangeEventId;
pub use crate::core::identifiers::EntityId;
pub use crate::core::identifiers::IdGenerator;
pub use crate::core::identifiers::ImportRunId;
pub use crate::core::identifiers::PropertyValueId;
pub use crate::core::identifiers::SourceId;
pub use crate::core::identifiers::WorkspaceId;
pub use crate::core::identifiers::WorkspaceIdError;
pub use crate::core::records::AssertionRecord;
pub use crate::core::records::BASE_SCENARIO;
pub use crate::core::records::ChangeEvent;
pub use crate::core::records::Entity;
pub use crate::core::records::EventType;
pub use crate::core::records::HAS_PROPERTY;
pub use crate::core::records::ImportRun;
pub use crate::core::records::PropertyValue;
pub use crate::core::records::RunStatus;
pub use crate::core::records::Source;
pub use crate::core::records::SourceType;
pub use crate::core::time::Clock;
pub use crate::core::time::FixedClock;
pub use crate::core::time::SharedClock;
pub use crate::core::time::SystemClock;
pub use interfaces::EntityUpsert;
pub use interfaces::GraphPort;
pub use interfaces::ImportRunUpdate;
pub use interfaces::LinkKind;
pub use interfaces::PortError;
pub use resolve::Claim;
pub use resolve::get_all_claims;
pub use resolve::resolve_assertion;
pub use resolve::resolve_entity_view;
