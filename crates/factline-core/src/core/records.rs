// crates/factline-core/src/core/records.rs
// ============================================================================
// Module: Factline Vertex Records
// Description: Record types for every vertex tag persisted into the graph.
// Purpose: Define the append-only data contract shared by engine and drivers.
// Dependencies: serde, time, crate::core::identifiers
// ============================================================================

//! ## Overview
//! The graph stores six vertex tags: `Entity`, `AssertionRecord`,
//! `PropertyValue`, `ChangeEvent`, `ImportRun`, and `Source`. Assertions
//! are bitemporal: `recorded_at` says when the system observed the claim,
//! `valid_from`/`valid_to` bound the claim's validity. An assertion is
//! never mutated in place except to set `valid_to` (closure).
//!
//! `ChangeEvent` names its timestamp field `ts` because backing stores
//! may reserve the word `timestamp`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::cell::ValueType;
use crate::core::identifiers::AssertionId;
use crate::core::identifiers::ChangeEventId;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::ImportRunId;
use crate::core::identifiers::PropertyValueId;
use crate::core::identifiers::SourceId;
use crate::core::identifiers::WorkspaceId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Relationship type marking a property assertion.
pub const HAS_PROPERTY: &str = "HAS_PROPERTY";

/// Default scenario namespace for assertions.
pub const BASE_SCENARIO: &str = "base";

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Provenance category of an assertion.
///
/// # Invariants
/// - Wire form is the lowercase name; the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Ingested from a spreadsheet import.
    Excel,
    /// Ingested through an API integration.
    Api,
    /// Entered by a human operator; overrides all other sources.
    Manual,
    /// Extracted by a language model.
    LlmExtracted,
    /// Derived by a computation.
    Computed,
}

impl SourceType {
    /// Returns the stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Excel => "excel",
            Self::Api => "api",
            Self::Manual => "manual",
            Self::LlmExtracted => "llm_extracted",
            Self::Computed => "computed",
        }
    }

    /// Parses a lowercase label back into a source type.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "excel" => Some(Self::Excel),
            "api" => Some(Self::Api),
            "manual" => Some(Self::Manual),
            "llm_extracted" => Some(Self::LlmExtracted),
            "computed" => Some(Self::Computed),
            _ => None,
        }
    }
}

/// Cause category of a change event.
///
/// # Invariants
/// - Wire form is the lowercase name; the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Diff produced by an import run.
    ImportDiff,
    /// Manual conflict resolution.
    ManualResolve,
    /// Scenario overlay delta.
    ScenarioDelta,
    /// Direct manual edit.
    ManualEdit,
}

impl EventType {
    /// Returns the stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ImportDiff => "import_diff",
            Self::ManualResolve => "manual_resolve",
            Self::ScenarioDelta => "scenario_delta",
            Self::ManualEdit => "manual_edit",
        }
    }

    /// Parses a lowercase label back into an event type.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "import_diff" => Some(Self::ImportDiff),
            "manual_resolve" => Some(Self::ManualResolve),
            "scenario_delta" => Some(Self::ScenarioDelta),
            "manual_edit" => Some(Self::ManualEdit),
            _ => None,
        }
    }
}

/// Execution status of an import run.
///
/// # Invariants
/// - Wire form is the lowercase name; the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is in progress.
    Running,
    /// The run finished; per-row errors may still be recorded.
    Completed,
    /// The run aborted before finishing.
    Failed,
}

impl RunStatus {
    /// Returns the stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a lowercase label back into a run status.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Entity
// ============================================================================

/// A real-world thing identified by its natural key.
///
/// # Invariants
/// - `(workspace_id, entity_type, primary_key)` maps to exactly one
///   `entity_id` across the workspace.
/// - Entities are created on first encounter and never deleted by the
///   engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// System identifier (`ent_` prefix).
    pub entity_id: EntityId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Domain entity type, e.g. `Item`.
    pub entity_type: String,
    /// Natural key rendered from the ingestion key template.
    pub primary_key: String,
    /// Optional human-readable label.
    pub display_name: Option<String>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last update timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Assertion Record
// ============================================================================

/// A first-class, timestamped claim about a property value or a
/// relationship.
///
/// # Invariants
/// - For any `(assertion_key, scenario_id)` at most one assertion has
///   `valid_to == None` at any time.
/// - `valid_from <= valid_to` when both are set.
/// - `raw_hash` and `normalized_hash` are computed at ingest time and
///   never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionRecord {
    /// System identifier (`asrt_` prefix).
    pub assertion_id: AssertionId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Logical slot this claim fills; competing claims share one key.
    pub assertion_key: String,
    /// SHA-256 of the canonical serialization of the claim's value.
    pub raw_hash: String,
    /// SHA-256 after normalization rules.
    pub normalized_hash: String,
    /// Provenance category.
    pub source_type: SourceType,
    /// Human-readable trace, e.g. `sheet:Items,row:7`.
    pub source_ref: Option<String>,
    /// Registered source handle used for authority lookup.
    pub source_id: Option<SourceId>,
    /// Import run that created this assertion.
    pub import_run_id: Option<ImportRunId>,
    /// When the system observed the claim.
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    /// Start of the claim's validity.
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    /// End of validity; `None` means currently open.
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub valid_to: Option<OffsetDateTime>,
    /// Scenario overlay namespace; defaults to `base`.
    pub scenario_id: String,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Back-link to the assertion closed by this one.
    pub supersedes: Option<AssertionId>,
    /// `HAS_PROPERTY` for property claims, else the domain relationship
    /// name.
    pub relationship_type: String,
    /// Property key; set iff `relationship_type == HAS_PROPERTY`.
    pub property_key: Option<String>,
}

impl AssertionRecord {
    /// Returns true when the assertion is currently open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Returns true when the assertion claims a property value.
    #[must_use]
    pub fn is_property(&self) -> bool {
        self.relationship_type == HAS_PROPERTY
    }
}

// ============================================================================
// SECTION: Property Value
// ============================================================================

/// Concrete typed value carried by a property assertion.
///
/// # Invariants
/// - Exactly one `PropertyValue` exists per `HAS_PROPERTY` assertion and
///   is owned by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    /// System identifier (`pv_` prefix).
    pub property_value_id: PropertyValueId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Property key the value belongs to.
    pub property_key: String,
    /// Value rendered as a string; `None` for a null cell.
    pub value: Option<String>,
    /// Declared type of the value.
    pub value_type: ValueType,
}

// ============================================================================
// SECTION: Change Event
// ============================================================================

/// Groups all mutations produced by a single cause.
///
/// # Invariants
/// - The timestamp field is named `ts`; `timestamp` is reserved by some
///   backing stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// System identifier (`ce_` prefix).
    pub change_event_id: ChangeEventId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Cause category.
    pub event_type: EventType,
    /// Human-readable summary of the event.
    pub description: Option<String>,
    /// Event timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    /// Import run that triggered the event, when applicable.
    pub import_run_id: Option<ImportRunId>,
    /// Acting principal, e.g. `system:import`.
    pub actor: Option<String>,
    /// Opaque JSON string of counters.
    pub stats: Option<String>,
}

// ============================================================================
// SECTION: Import Run
// ============================================================================

/// Execution record of one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRun {
    /// System identifier (`ir_` prefix).
    pub import_run_id: ImportRunId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Name of the imported file.
    pub source_file: Option<String>,
    /// Ingestion spec the run executed.
    pub spec_name: Option<String>,
    /// When the run started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// When the run finished, if it has.
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub completed_at: Option<OffsetDateTime>,
    /// Current run status.
    pub status: RunStatus,
    /// Opaque JSON string of counters.
    pub stats: Option<String>,
    /// Failure message for failed runs.
    pub error_message: Option<String>,
}

// ============================================================================
// SECTION: Source
// ============================================================================

/// Registered provenance metadata consulted by the resolved view.
///
/// # Invariants
/// - Lower `authority_rank` values denote more authoritative sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// System identifier (`src_` prefix).
    pub source_id: SourceId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Human-readable source name.
    pub source_name: String,
    /// Provenance category label.
    pub source_type: String,
    /// Authority rank; lower is more authoritative.
    pub authority_rank: i64,
    /// Optional JSON list of domains the source is authoritative for.
    pub authority_domains: Option<String>,
    /// Optional update cadence description.
    pub update_frequency: Option<String>,
    /// Optional free-form description.
    pub description: Option<String>,
}
