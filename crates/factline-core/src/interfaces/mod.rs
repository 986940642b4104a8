// crates/factline-core/src/interfaces/mod.rs
// ============================================================================
// Module: Factline Interfaces
// Description: Backend-agnostic storage port for the knowledge graph.
// Purpose: Define the narrow capability set the engine requires from any
//          graph backend.
// Dependencies: serde, thiserror, time, crate::core
// ============================================================================

//! ## Overview
//! The [`GraphPort`] is the only seam between the ingestion engine and
//! the backing graph store. Every operation is workspace-scoped.
//! Implementations must escape all user-supplied strings, must never put
//! a NULL `valid_to` into an equality predicate (open-assertion filtering
//! happens on the client side of the query), and must not partially
//! commit within a single call. Any backend failure surfaces as a
//! retryable [`PortError::Unavailable`] condition.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;
use time::OffsetDateTime;

use crate::core::identifiers::AssertionId;
use crate::core::identifiers::ChangeEventId;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::ImportRunId;
use crate::core::identifiers::PropertyValueId;
use crate::core::identifiers::SourceId;
use crate::core::identifiers::WorkspaceId;
use crate::core::records::AssertionRecord;
use crate::core::records::ChangeEvent;
use crate::core::records::Entity;
use crate::core::records::ImportRun;
use crate::core::records::PropertyValue;
use crate::core::records::RunStatus;
use crate::core::records::Source;

// ============================================================================
// SECTION: Edge Types
// ============================================================================

/// Edge type linking entities through assertions to values or entities.
pub const EDGE_ASSERTED_REL: &str = "ASSERTED_REL";

/// Edge type from a change event to an assertion it created.
pub const EDGE_CREATED_ASSERTION: &str = "CREATED_ASSERTION";

/// Edge type from a change event to an assertion it closed.
pub const EDGE_CLOSED_ASSERTION: &str = "CLOSED_ASSERTION";

/// Edge type from a change event to the import run that triggered it.
pub const EDGE_TRIGGERED_BY: &str = "TRIGGERED_BY";

/// Direction of a change event to assertion link.
///
/// # Invariants
/// - Variants map 1:1 to the `CREATED_ASSERTION` / `CLOSED_ASSERTION`
///   edge types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// The change event created the assertion.
    Created,
    /// The change event closed the assertion.
    Closed,
}

impl LinkKind {
    /// Returns the persisted edge type for the link kind.
    #[must_use]
    pub const fn edge_type(self) -> &'static str {
        match self {
            Self::Created => EDGE_CREATED_ASSERTION,
            Self::Closed => EDGE_CLOSED_ASSERTION,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Graph port errors.
///
/// # Invariants
/// - All backend failures are reported through `Unavailable` so callers
///   can treat the store uniformly as retryable.
#[derive(Debug, Error, Clone)]
pub enum PortError {
    /// The store failed or cannot be reached; the call may be retried.
    #[error("graph store unavailable: {0}")]
    Unavailable(String),
    /// Stored data failed to decode into a record.
    #[error("graph store corruption: {0}")]
    Corrupt(String),
}

// ============================================================================
// SECTION: Operation Payloads
// ============================================================================

/// Outcome of an entity upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityUpsert {
    /// Identifier of the stored entity.
    pub entity_id: EntityId,
    /// True when the upsert inserted a new entity.
    pub created: bool,
}

/// Partial update applied to an import run.
///
/// # Invariants
/// - `None` fields are left untouched by the driver.
#[derive(Debug, Clone, Default)]
pub struct ImportRunUpdate {
    /// New run status.
    pub status: Option<RunStatus>,
    /// Completion timestamp.
    pub completed_at: Option<OffsetDateTime>,
    /// Stats counters as a JSON string.
    pub stats: Option<String>,
    /// Failure message.
    pub error_message: Option<String>,
}

// ============================================================================
// SECTION: Graph Port
// ============================================================================

/// Narrow, synchronous capability set over the backing graph store.
///
/// All calls are potential blocking I/O points; callers must not hold
/// in-memory critical sections across them. Writes issued by one run
/// must be applied in call order because the at-most-one-open invariant
/// relies on a close-before-create sequence reading its own preceding
/// write.
pub trait GraphPort: Send + Sync {
    /// Finds or inserts the entity identified by
    /// `(workspace, entity_type, primary_key)`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn upsert_entity(
        &self,
        workspace_id: &WorkspaceId,
        entity_type: &str,
        primary_key: &str,
        display_name: Option<&str>,
    ) -> Result<EntityUpsert, PortError>;

    /// Finds an entity by its natural key triple.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn lookup_entity(
        &self,
        workspace_id: &WorkspaceId,
        entity_type: &str,
        primary_key: &str,
    ) -> Result<Option<Entity>, PortError>;

    /// Fetches an entity by system identifier, scoped to the workspace.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn get_entity(
        &self,
        workspace_id: &WorkspaceId,
        entity_id: &EntityId,
    ) -> Result<Option<Entity>, PortError>;

    /// Searches entities with optional type and key filters.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn search_entities(
        &self,
        workspace_id: &WorkspaceId,
        entity_type: Option<&str>,
        primary_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Entity>, PortError>;

    /// Inserts a new assertion vertex.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn insert_assertion(&self, assertion: &AssertionRecord) -> Result<AssertionId, PortError>;

    /// Closes an assertion by setting its `valid_to`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn close_assertion(
        &self,
        assertion_id: &AssertionId,
        valid_to: OffsetDateTime,
    ) -> Result<(), PortError>;

    /// Returns the open assertions for an assertion key and scenario.
    ///
    /// The store is queried by `(workspace, key, scenario)` only; the
    /// open-only (`valid_to == None`) filter is applied client-side
    /// because the backing store cannot filter on NULL.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn lookup_assertions_by_key(
        &self,
        workspace_id: &WorkspaceId,
        assertion_key: &str,
        scenario_id: &str,
    ) -> Result<Vec<AssertionRecord>, PortError>;

    /// Returns every assertion created by an import run, open or closed.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn lookup_assertions_by_import_run(
        &self,
        import_run_id: &ImportRunId,
    ) -> Result<Vec<AssertionRecord>, PortError>;

    /// Returns all assertions connected to an entity through
    /// `ASSERTED_REL` edges (reverse traversal).
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn get_assertions_for_entity(
        &self,
        workspace_id: &WorkspaceId,
        entity_id: &EntityId,
    ) -> Result<Vec<AssertionRecord>, PortError>;

    /// Inserts a property value vertex.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn insert_property_value(
        &self,
        property_value: &PropertyValue,
    ) -> Result<PropertyValueId, PortError>;

    /// Fetches a property value vertex by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn get_property_value(
        &self,
        property_value_id: &PropertyValueId,
    ) -> Result<Option<PropertyValue>, PortError>;

    /// Inserts a change event vertex.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn insert_change_event(&self, change_event: &ChangeEvent) -> Result<ChangeEventId, PortError>;

    /// Inserts the two directed `ASSERTED_REL` edges
    /// `from → assertion → to` as one atomic operation.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn create_asserted_rel(
        &self,
        from_vertex: &str,
        assertion_id: &AssertionId,
        to_vertex: &str,
    ) -> Result<(), PortError>;

    /// Links a change event to an assertion it created.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn link_created_assertion(
        &self,
        change_event_id: &ChangeEventId,
        assertion_id: &AssertionId,
    ) -> Result<(), PortError>;

    /// Links a change event to an assertion it closed.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn link_closed_assertion(
        &self,
        change_event_id: &ChangeEventId,
        assertion_id: &AssertionId,
    ) -> Result<(), PortError>;

    /// Links a change event to the import run that triggered it.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn link_triggered_by(
        &self,
        change_event_id: &ChangeEventId,
        import_run_id: &ImportRunId,
    ) -> Result<(), PortError>;

    /// Returns the change event triggered by an import run, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn get_change_event_by_import_run(
        &self,
        workspace_id: &WorkspaceId,
        import_run_id: &ImportRunId,
    ) -> Result<Option<ChangeEvent>, PortError>;

    /// Returns the assertions a change event created or closed.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn lookup_assertions_by_change_event(
        &self,
        change_event_id: &ChangeEventId,
        kind: LinkKind,
    ) -> Result<Vec<AssertionRecord>, PortError>;

    /// Returns the target vertex of an assertion's outgoing
    /// `ASSERTED_REL` edge (a property value or an entity).
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn get_asserted_rel_target(
        &self,
        assertion_id: &AssertionId,
    ) -> Result<Option<String>, PortError>;

    /// Inserts an import run vertex.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn insert_import_run(&self, import_run: &ImportRun) -> Result<(), PortError>;

    /// Applies a partial update to an import run.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn update_import_run(
        &self,
        import_run_id: &ImportRunId,
        update: &ImportRunUpdate,
    ) -> Result<(), PortError>;

    /// Fetches an import run by identifier, scoped to the workspace.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn get_import_run(
        &self,
        workspace_id: &WorkspaceId,
        import_run_id: &ImportRunId,
    ) -> Result<Option<ImportRun>, PortError>;

    /// Lists import runs for a workspace, most recently started first.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn list_import_runs(
        &self,
        workspace_id: &WorkspaceId,
        limit: usize,
    ) -> Result<Vec<ImportRun>, PortError>;

    /// Inserts or replaces a registered source.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn upsert_source(&self, source: &Source) -> Result<SourceId, PortError>;

    /// Lists all registered sources for a workspace.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn list_sources(&self, workspace_id: &WorkspaceId) -> Result<Vec<Source>, PortError>;

    /// Builds the `source_id → authority_rank` map for resolution.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the store is unavailable.
    fn get_source_authority_map(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<BTreeMap<String, i64>, PortError> {
        Ok(self
            .list_sources(workspace_id)?
            .into_iter()
            .map(|source| (source.source_id.as_str().to_string(), source.authority_rank))
            .collect())
    }
}
