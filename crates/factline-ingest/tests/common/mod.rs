// crates/factline-ingest/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared fixtures and the in-memory graph port double.
// Purpose: Provide a deterministic store and workbook/spec builders for
//          parser, engine, and view tests.
// Dependencies: factline-config, factline-core, factline-ingest, time
// ============================================================================

//! ## Overview
//! [`MemoryGraph`] implements the full graph port over plain vectors so
//! engine tests can inspect every persisted vertex and edge. Fixtures
//! build the canonical three-column Items workbook and its ingestion
//! spec.

#![allow(
    dead_code,
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Shared across integration test binaries; not every binary uses every helper."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use factline_config::IngestionSpec;
use factline_config::ingestion::parse_spec;
use factline_core::AssertionId;
use factline_core::AssertionRecord;
use factline_core::Cell;
use factline_core::ChangeEvent;
use factline_core::ChangeEventId;
use factline_core::Entity;
use factline_core::EntityId;
use factline_core::EntityUpsert;
use factline_core::FixedClock;
use factline_core::GraphPort;
use factline_core::IdGenerator;
use factline_core::ImportRun;
use factline_core::ImportRunId;
use factline_core::ImportRunUpdate;
use factline_core::LinkKind;
use factline_core::PortError;
use factline_core::PropertyValue;
use factline_core::PropertyValueId;
use factline_core::SharedClock;
use factline_core::Source;
use factline_core::SourceId;
use factline_core::WorkspaceId;
use factline_core::interfaces::EDGE_ASSERTED_REL;
use factline_core::interfaces::EDGE_TRIGGERED_BY;
use factline_ingest::Sheet;
use factline_ingest::Workbook;
use time::OffsetDateTime;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Instant used by the fixed test clock.
pub const TEST_TIME: OffsetDateTime = datetime!(2024-01-15 10:00:00 UTC);

/// Returns the shared fixed clock for deterministic runs.
pub fn test_clock() -> SharedClock {
    Arc::new(FixedClock::new(TEST_TIME))
}

/// Clock advancing one second per reading, for tests spanning multiple
/// runs where recency must be observable.
pub struct SteppingClock {
    /// Seconds elapsed since [`TEST_TIME`] at the next reading.
    ticks: std::sync::atomic::AtomicI64,
}

impl Default for SteppingClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SteppingClock {
    /// Creates a clock starting at [`TEST_TIME`].
    pub fn new() -> Self {
        Self {
            ticks: std::sync::atomic::AtomicI64::new(0),
        }
    }
}

impl factline_core::Clock for SteppingClock {
    fn now(&self) -> OffsetDateTime {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        TEST_TIME + time::Duration::seconds(tick)
    }
}

/// Returns a shared stepping clock.
pub fn stepping_clock() -> SharedClock {
    Arc::new(SteppingClock::new())
}

/// Parses the canonical Items ingestion spec.
pub fn items_spec() -> IngestionSpec {
    parse_spec(
        r#"
spec_name: items
spec_version: "1"
workspace_id: acme
sheets:
  - sheet_name: Items
    entities:
      item:
        entity_type: Item
        key_columns: [item_code]
        key_template: "{item_code}"
        properties:
          - source_column: "Item Code"
            target_property: item_code
          - source_column: "Name"
            target_property: name
          - source_column: "Price"
            target_property: price
"#,
    )
    .expect("items spec")
}

/// Parses a spec with two entities and a relationship per row.
pub fn storage_spec() -> IngestionSpec {
    parse_spec(
        r#"
spec_name: storage
spec_version: "1"
workspace_id: acme
sheets:
  - sheet_name: Storage
    entities:
      item:
        entity_type: Item
        key_columns: [item_code]
        key_template: "{item_code}"
        properties:
          - source_column: "Item Code"
            target_property: item_code
      location:
        entity_type: Location
        key_columns: [location_id]
        key_template: "{location_id}"
        properties:
          - source_column: "Location"
            target_property: location_id
    relationships:
      - relationship_type: STORED_AT
        from_entity: item
        to_entity: location
"#,
    )
    .expect("storage spec")
}

/// Builds a single-sheet workbook from rows of cells.
pub fn workbook(sheet_name: &str, rows: Vec<Vec<Cell>>) -> Workbook {
    Workbook {
        sheets: vec![Sheet {
            name: sheet_name.to_string(),
            rows,
        }],
    }
}

/// Text cell shorthand.
pub fn text(value: &str) -> Cell {
    Cell::Text(value.to_string())
}

/// The canonical two-item workbook from the clean-import scenario.
pub fn items_workbook() -> Workbook {
    workbook(
        "Items",
        vec![
            vec![text("Item Code"), text("Name"), text("Price")],
            vec![text("ITM001"), text("Widget"), Cell::Float(9.99)],
            vec![text("ITM002"), text("Gadget"), Cell::Float(19.99)],
        ],
    )
}

/// The acme workspace identifier.
pub fn acme() -> WorkspaceId {
    WorkspaceId::new("acme").expect("workspace")
}

// ============================================================================
// SECTION: Memory Graph
// ============================================================================

/// One directed edge held by the memory graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Source vertex identifier.
    pub src_id: String,
    /// Target vertex identifier.
    pub dst_id: String,
    /// Edge type label.
    pub edge_type: String,
}

/// Mutable vertex and edge storage.
#[derive(Debug, Default)]
pub struct GraphState {
    /// Entity vertices in insertion order.
    pub entities: Vec<Entity>,
    /// Assertion vertices in insertion order.
    pub assertions: Vec<AssertionRecord>,
    /// Property value vertices in insertion order.
    pub property_values: Vec<PropertyValue>,
    /// Change event vertices in insertion order.
    pub change_events: Vec<ChangeEvent>,
    /// Import run vertices in insertion order.
    pub import_runs: Vec<ImportRun>,
    /// Source vertices in insertion order.
    pub sources: Vec<Source>,
    /// Directed edges in insertion order.
    pub edges: Vec<Edge>,
}

/// In-memory graph port double with inspectable state and fault toggles.
pub struct MemoryGraph {
    /// Stored vertices and edges.
    state: Mutex<GraphState>,
    /// Identifier generator for entity upserts.
    ids: IdGenerator,
    /// Clock stamping entity creation times.
    clock: SharedClock,
    /// Fails the next `insert_import_run` call when set.
    fail_insert_import_run: AtomicBool,
    /// Fails every `insert_property_value` call while set.
    fail_insert_property_value: AtomicBool,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    /// Creates an empty memory graph on the fixed test clock.
    pub fn new() -> Self {
        let clock = test_clock();
        Self {
            state: Mutex::new(GraphState::default()),
            ids: IdGenerator::new(Arc::clone(&clock)),
            clock,
            fail_insert_import_run: AtomicBool::new(false),
            fail_insert_property_value: AtomicBool::new(false),
        }
    }

    /// Makes `insert_import_run` fail until cleared.
    pub fn fail_import_run_inserts(&self) {
        self.fail_insert_import_run.store(true, Ordering::SeqCst);
    }

    /// Makes `insert_property_value` fail until cleared.
    pub fn fail_property_value_inserts(&self) {
        self.fail_insert_property_value.store(true, Ordering::SeqCst);
    }

    /// Locks the state for inspection.
    pub fn state(&self) -> MutexGuard<'_, GraphState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns every stored assertion for one assertion key.
    pub fn assertions_for_key(&self, key: &str) -> Vec<AssertionRecord> {
        self.state()
            .assertions
            .iter()
            .filter(|a| a.assertion_key == key)
            .cloned()
            .collect()
    }

    /// Counts edges of one type leaving a vertex.
    pub fn edges_from(&self, src_id: &str, edge_type: &str) -> usize {
        self.state()
            .edges
            .iter()
            .filter(|edge| edge.src_id == src_id && edge.edge_type == edge_type)
            .count()
    }
}

impl GraphPort for MemoryGraph {
    fn upsert_entity(
        &self,
        workspace_id: &WorkspaceId,
        entity_type: &str,
        primary_key: &str,
        display_name: Option<&str>,
    ) -> Result<EntityUpsert, PortError> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = state.entities.iter().find(|entity| {
            entity.workspace_id == *workspace_id
                && entity.entity_type == entity_type
                && entity.primary_key == primary_key
        }) {
            return Ok(EntityUpsert {
                entity_id: existing.entity_id.clone(),
                created: false,
            });
        }
        let entity_id = self.ids.entity_id();
        let now = self.clock.now();
        state.entities.push(Entity {
            entity_id: entity_id.clone(),
            workspace_id: workspace_id.clone(),
            entity_type: entity_type.to_string(),
            primary_key: primary_key.to_string(),
            display_name: display_name.map(ToString::to_string),
            created_at: now,
            updated_at: now,
        });
        Ok(EntityUpsert {
            entity_id,
            created: true,
        })
    }

    fn lookup_entity(
        &self,
        workspace_id: &WorkspaceId,
        entity_type: &str,
        primary_key: &str,
    ) -> Result<Option<Entity>, PortError> {
        Ok(self
            .state()
            .entities
            .iter()
            .find(|entity| {
                entity.workspace_id == *workspace_id
                    && entity.entity_type == entity_type
                    && entity.primary_key == primary_key
            })
            .cloned())
    }

    fn get_entity(
        &self,
        workspace_id: &WorkspaceId,
        entity_id: &EntityId,
    ) -> Result<Option<Entity>, PortError> {
        Ok(self
            .state()
            .entities
            .iter()
            .find(|entity| {
                entity.entity_id == *entity_id && entity.workspace_id == *workspace_id
            })
            .cloned())
    }

    fn search_entities(
        &self,
        workspace_id: &WorkspaceId,
        entity_type: Option<&str>,
        primary_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Entity>, PortError> {
        Ok(self
            .state()
            .entities
            .iter()
            .filter(|entity| {
                entity.workspace_id == *workspace_id
                    && entity_type.is_none_or(|wanted| entity.entity_type == wanted)
                    && primary_key.is_none_or(|wanted| entity.primary_key == wanted)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    fn insert_assertion(&self, assertion: &AssertionRecord) -> Result<AssertionId, PortError> {
        self.state().assertions.push(assertion.clone());
        Ok(assertion.assertion_id.clone())
    }

    fn close_assertion(
        &self,
        assertion_id: &AssertionId,
        valid_to: OffsetDateTime,
    ) -> Result<(), PortError> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for assertion in &mut state.assertions {
            if assertion.assertion_id == *assertion_id {
                assertion.valid_to = Some(valid_to);
            }
        }
        Ok(())
    }

    fn lookup_assertions_by_key(
        &self,
        workspace_id: &WorkspaceId,
        assertion_key: &str,
        scenario_id: &str,
    ) -> Result<Vec<AssertionRecord>, PortError> {
        Ok(self
            .state()
            .assertions
            .iter()
            .filter(|a| {
                a.workspace_id == *workspace_id
                    && a.assertion_key == assertion_key
                    && a.scenario_id == scenario_id
                    && a.is_open()
            })
            .cloned()
            .collect())
    }

    fn lookup_assertions_by_import_run(
        &self,
        import_run_id: &ImportRunId,
    ) -> Result<Vec<AssertionRecord>, PortError> {
        Ok(self
            .state()
            .assertions
            .iter()
            .filter(|a| a.import_run_id.as_ref() == Some(import_run_id))
            .cloned()
            .collect())
    }

    fn get_assertions_for_entity(
        &self,
        workspace_id: &WorkspaceId,
        entity_id: &EntityId,
    ) -> Result<Vec<AssertionRecord>, PortError> {
        let state = self.state();
        let assertion_ids: Vec<&str> = state
            .edges
            .iter()
            .filter(|edge| {
                edge.src_id == entity_id.as_str() && edge.edge_type == EDGE_ASSERTED_REL
            })
            .map(|edge| edge.dst_id.as_str())
            .collect();
        Ok(state
            .assertions
            .iter()
            .filter(|a| {
                a.workspace_id == *workspace_id
                    && assertion_ids.contains(&a.assertion_id.as_str())
            })
            .cloned()
            .collect())
    }

    fn insert_property_value(
        &self,
        property_value: &PropertyValue,
    ) -> Result<PropertyValueId, PortError> {
        if self.fail_insert_property_value.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("injected property value fault".to_string()));
        }
        self.state().property_values.push(property_value.clone());
        Ok(property_value.property_value_id.clone())
    }

    fn get_property_value(
        &self,
        property_value_id: &PropertyValueId,
    ) -> Result<Option<PropertyValue>, PortError> {
        Ok(self
            .state()
            .property_values
            .iter()
            .find(|pv| pv.property_value_id == *property_value_id)
            .cloned())
    }

    fn insert_change_event(&self, change_event: &ChangeEvent) -> Result<ChangeEventId, PortError> {
        self.state().change_events.push(change_event.clone());
        Ok(change_event.change_event_id.clone())
    }

    fn create_asserted_rel(
        &self,
        from_vertex: &str,
        assertion_id: &AssertionId,
        to_vertex: &str,
    ) -> Result<(), PortError> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.edges.push(Edge {
            src_id: from_vertex.to_string(),
            dst_id: assertion_id.as_str().to_string(),
            edge_type: EDGE_ASSERTED_REL.to_string(),
        });
        state.edges.push(Edge {
            src_id: assertion_id.as_str().to_string(),
            dst_id: to_vertex.to_string(),
            edge_type: EDGE_ASSERTED_REL.to_string(),
        });
        Ok(())
    }

    fn link_created_assertion(
        &self,
        change_event_id: &ChangeEventId,
        assertion_id: &AssertionId,
    ) -> Result<(), PortError> {
        self.state().edges.push(Edge {
            src_id: change_event_id.as_str().to_string(),
            dst_id: assertion_id.as_str().to_string(),
            edge_type: LinkKind::Created.edge_type().to_string(),
        });
        Ok(())
    }

    fn link_closed_assertion(
        &self,
        change_event_id: &ChangeEventId,
        assertion_id: &AssertionId,
    ) -> Result<(), PortError> {
        self.state().edges.push(Edge {
            src_id: change_event_id.as_str().to_string(),
            dst_id: assertion_id.as_str().to_string(),
            edge_type: LinkKind::Closed.edge_type().to_string(),
        });
        Ok(())
    }

    fn link_triggered_by(
        &self,
        change_event_id: &ChangeEventId,
        import_run_id: &ImportRunId,
    ) -> Result<(), PortError> {
        self.state().edges.push(Edge {
            src_id: change_event_id.as_str().to_string(),
            dst_id: import_run_id.as_str().to_string(),
            edge_type: EDGE_TRIGGERED_BY.to_string(),
        });
        Ok(())
    }

    fn get_change_event_by_import_run(
        &self,
        workspace_id: &WorkspaceId,
        import_run_id: &ImportRunId,
    ) -> Result<Option<ChangeEvent>, PortError> {
        Ok(self
            .state()
            .change_events
            .iter()
            .rev()
            .find(|event| {
                event.workspace_id == *workspace_id
                    && event.import_run_id.as_ref() == Some(import_run_id)
            })
            .cloned())
    }

    fn lookup_assertions_by_change_event(
        &self,
        change_event_id: &ChangeEventId,
        kind: LinkKind,
    ) -> Result<Vec<AssertionRecord>, PortError> {
        let state = self.state();
        let targets: Vec<&str> = state
            .edges
            .iter()
            .filter(|edge| {
                edge.src_id == change_event_id.as_str() && edge.edge_type == kind.edge_type()
            })
            .map(|edge| edge.dst_id.as_str())
            .collect();
        Ok(state
            .assertions
            .iter()
            .filter(|a| targets.contains(&a.assertion_id.as_str()))
            .cloned()
            .collect())
    }

    fn get_asserted_rel_target(
        &self,
        assertion_id: &AssertionId,
    ) -> Result<Option<String>, PortError> {
        Ok(self
            .state()
            .edges
            .iter()
            .find(|edge| {
                edge.src_id == assertion_id.as_str() && edge.edge_type == EDGE_ASSERTED_REL
            })
            .map(|edge| edge.dst_id.clone()))
    }

    fn insert_import_run(&self, import_run: &ImportRun) -> Result<(), PortError> {
        if self.fail_insert_import_run.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("injected import run fault".to_string()));
        }
        self.state().import_runs.push(import_run.clone());
        Ok(())
    }

    fn update_import_run(
        &self,
        import_run_id: &ImportRunId,
        update: &ImportRunUpdate,
    ) -> Result<(), PortError> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for run in &mut state.import_runs {
            if run.import_run_id != *import_run_id {
                continue;
            }
            if let Some(status) = update.status {
                run.status = status;
            }
            if let Some(completed_at) = update.completed_at {
                run.completed_at = Some(completed_at);
            }
            if let Some(stats) = &update.stats {
                run.stats = Some(stats.clone());
            }
            if let Some(error_message) = &update.error_message {
                run.error_message = Some(error_message.clone());
            }
        }
        Ok(())
    }

    fn get_import_run(
        &self,
        workspace_id: &WorkspaceId,
        import_run_id: &ImportRunId,
    ) -> Result<Option<ImportRun>, PortError> {
        Ok(self
            .state()
            .import_runs
            .iter()
            .find(|run| {
                run.import_run_id == *import_run_id && run.workspace_id == *workspace_id
            })
            .cloned())
    }

    fn list_import_runs(
        &self,
        workspace_id: &WorkspaceId,
        limit: usize,
    ) -> Result<Vec<ImportRun>, PortError> {
        let mut runs: Vec<ImportRun> = self
            .state()
            .import_runs
            .iter()
            .filter(|run| run.workspace_id == *workspace_id)
            .cloned()
            .collect();
        // Fixed-clock runs share started_at; most recently inserted first.
        runs.reverse();
        runs.sort_by(|left, right| right.started_at.cmp(&left.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    fn upsert_source(&self, source: &Source) -> Result<SourceId, PortError> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.sources.retain(|existing| existing.source_id != source.source_id);
        state.sources.push(source.clone());
        Ok(source.source_id.clone())
    }

    fn list_sources(&self, workspace_id: &WorkspaceId) -> Result<Vec<Source>, PortError> {
        Ok(self
            .state()
            .sources
            .iter()
            .filter(|source| source.workspace_id == *workspace_id)
            .cloned()
            .collect())
    }
}

/// Authority map helper mirroring the default trait method.
pub fn authority_of(graph: &MemoryGraph, workspace_id: &WorkspaceId) -> BTreeMap<String, i64> {
    graph
        .get_source_authority_map(workspace_id)
        .expect("authority map")
}
