// crates/factline-ingest/tests/engine.rs
// ============================================================================
// Module: Ingestion Engine Tests
// Description: End-to-end import scenarios over the in-memory graph port.
// ============================================================================
//! ## Overview
//! Covers the documented import scenarios: clean import, re-import
//! idempotence, normalized vs strict change detection, value changes
//! with supersedes linkage, disappearance closure, cancellation, and
//! per-row fault tolerance.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use common::MemoryGraph;
use common::acme;
use common::items_spec;
use common::items_workbook;
use common::storage_spec;
use common::test_clock;
use common::text;
use common::workbook;
use factline_config::IngestionSpec;
use factline_core::Cell;
use factline_core::GraphPort;
use factline_core::RunStatus;
use factline_ingest::CancelToken;
use factline_ingest::ImportResult;
use factline_ingest::IngestionEngine;
use factline_ingest::Workbook;
use factline_ingest::WorkbookInput;

/// Runs one import over a shared memory graph.
fn import(graph: &Arc<MemoryGraph>, book: &Workbook, spec: &IngestionSpec) -> ImportResult {
    let engine = IngestionEngine::new(Arc::clone(graph) as Arc<dyn GraphPort>, test_clock());
    engine.run_import(
        &acme(),
        WorkbookInput::Parsed(book),
        spec,
        None,
        Some("items.json"),
        &CancelToken::new(),
    )
}

#[test]
fn clean_import_creates_entities_and_assertions() {
    let graph = Arc::new(MemoryGraph::new());
    let result = import(&graph, &items_workbook(), &items_spec());

    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.errors.is_empty());
    assert_eq!(result.stats.entities_created, 2);
    assert_eq!(result.stats.entities_existing, 0);
    assert_eq!(result.stats.assertions_created, 6);
    assert_eq!(result.stats.assertions_modified, 0);
    assert_eq!(result.stats.assertions_closed, 0);
    assert_eq!(result.stats.assertions_unchanged, 0);

    let change_event_id = result.change_event_id.expect("change event");
    assert_eq!(graph.edges_from(change_event_id.as_str(), "CREATED_ASSERTION"), 6);
    assert_eq!(graph.edges_from(change_event_id.as_str(), "TRIGGERED_BY"), 1);

    let state = graph.state();
    assert_eq!(state.entities.len(), 2);
    assert_eq!(state.assertions.len(), 6);
    assert_eq!(state.property_values.len(), 6);
    assert_eq!(state.change_events.len(), 1);
    let run = &state.import_runs[0];
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.completed_at.is_some());
    assert!(run.stats.as_deref().is_some_and(|s| s.contains("\"assertions_created\":6")));
}

#[test]
fn assertions_carry_provenance_and_hashes() {
    let graph = Arc::new(MemoryGraph::new());
    let result = import(&graph, &items_workbook(), &items_spec());

    let assertions = graph.assertions_for_key("acme:Item:ITM001:prop:price");
    assert_eq!(assertions.len(), 1);
    let assertion = &assertions[0];
    assert_eq!(assertion.relationship_type, "HAS_PROPERTY");
    assert_eq!(assertion.property_key.as_deref(), Some("price"));
    assert_eq!(assertion.scenario_id, "base");
    assert!(assertion.is_open());
    assert_eq!(assertion.raw_hash.len(), 64);
    assert_eq!(assertion.normalized_hash.len(), 64);
    assert_eq!(assertion.source_ref.as_deref(), Some("sheet:Items,row:1"));
    assert_eq!(
        assertion.import_run_id.as_ref().map(|id| id.as_str().to_string()),
        Some(result.import_run_id.as_str().to_string())
    );
}

#[test]
fn reimport_of_identical_file_is_idempotent() {
    let graph = Arc::new(MemoryGraph::new());
    import(&graph, &items_workbook(), &items_spec());
    let second = import(&graph, &items_workbook(), &items_spec());

    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.stats.assertions_created, 0);
    assert_eq!(second.stats.assertions_modified, 0);
    assert_eq!(second.stats.assertions_closed, 0);
    assert_eq!(second.stats.assertions_unchanged, 6);
    assert_eq!(second.stats.entities_existing, 2);
    assert!(second.change_event_id.is_none());
}

#[test]
fn whitespace_reimport_is_unchanged_in_normalized_mode() {
    let graph = Arc::new(MemoryGraph::new());
    import(&graph, &items_workbook(), &items_spec());

    let padded = workbook(
        "Items",
        vec![
            vec![text("Item Code"), text("Name"), text("Price")],
            vec![text("ITM001"), text("  Widget "), Cell::Float(9.99)],
            vec![text("ITM002"), text("Gadget"), Cell::Float(19.99)],
        ],
    );
    let second = import(&graph, &padded, &items_spec());

    assert_eq!(second.stats.assertions_unchanged, 6);
    assert_eq!(second.stats.assertions_modified, 0);
    assert_eq!(second.stats.assertions_created, 0);
    assert_eq!(second.stats.assertions_closed, 0);
}

#[test]
fn whitespace_reimport_is_modified_in_strict_mode() {
    let graph = Arc::new(MemoryGraph::new());
    let mut spec = items_spec();
    spec.change_detection.mode = factline_core::hashing::ChangeDetectionMode::Strict;

    import(&graph, &items_workbook(), &spec);

    let padded = workbook(
        "Items",
        vec![
            vec![text("Item Code"), text("Name"), text("Price")],
            vec![text("ITM001"), text("  Widget "), Cell::Float(9.99)],
            vec![text("ITM002"), text("Gadget"), Cell::Float(19.99)],
        ],
    );
    let second = import(&graph, &padded, &spec);

    assert_eq!(second.stats.assertions_modified, 1);
    assert_eq!(second.stats.assertions_unchanged, 5);
    assert_eq!(second.stats.assertions_created, 0);

    // The old name assertion is closed; the padded one is open.
    let name_assertions = graph.assertions_for_key("acme:Item:ITM001:prop:name");
    assert_eq!(name_assertions.len(), 2);
    let open: Vec<_> = name_assertions.iter().filter(|a| a.is_open()).collect();
    assert_eq!(open.len(), 1);
}

#[test]
fn price_change_closes_and_supersedes() {
    let graph = Arc::new(MemoryGraph::new());
    import(&graph, &items_workbook(), &items_spec());

    let updated = workbook(
        "Items",
        vec![
            vec![text("Item Code"), text("Name"), text("Price")],
            vec![text("ITM001"), text("Widget"), Cell::Float(11.99)],
            vec![text("ITM002"), text("Gadget"), Cell::Float(19.99)],
        ],
    );
    let second = import(&graph, &updated, &items_spec());

    assert_eq!(second.stats.assertions_modified, 1);
    assert_eq!(second.stats.assertions_unchanged, 5);
    assert_eq!(second.stats.assertions_closed, 0);

    let price_assertions = graph.assertions_for_key("acme:Item:ITM001:prop:price");
    assert_eq!(price_assertions.len(), 2);
    let old = price_assertions.iter().find(|a| !a.is_open()).expect("closed");
    let new = price_assertions.iter().find(|a| a.is_open()).expect("open");
    assert_eq!(old.valid_to, Some(common::TEST_TIME));
    assert_eq!(
        new.supersedes.as_ref().map(|id| id.as_str().to_string()),
        Some(old.assertion_id.as_str().to_string())
    );

    let change_event_id = second.change_event_id.expect("change event");
    assert_eq!(graph.edges_from(change_event_id.as_str(), "CREATED_ASSERTION"), 1);
    assert_eq!(graph.edges_from(change_event_id.as_str(), "CLOSED_ASSERTION"), 1);
}

#[test]
fn disappearance_closes_open_assertions_of_missing_rows() {
    let graph = Arc::new(MemoryGraph::new());
    import(&graph, &items_workbook(), &items_spec());

    let only_second = workbook(
        "Items",
        vec![
            vec![text("Item Code"), text("Name"), text("Price")],
            vec![text("ITM002"), text("Gadget"), Cell::Float(19.99)],
        ],
    );
    let second = import(&graph, &only_second, &items_spec());

    assert_eq!(second.stats.assertions_closed, 3);
    assert_eq!(second.stats.assertions_created, 0);
    assert_eq!(second.stats.assertions_modified, 0);
    assert_eq!(second.stats.assertions_unchanged, 3);

    for key in [
        "acme:Item:ITM001:prop:item_code",
        "acme:Item:ITM001:prop:name",
        "acme:Item:ITM001:prop:price",
    ] {
        let assertions = graph.assertions_for_key(key);
        assert_eq!(assertions.len(), 1, "{key} should have one assertion");
        assert_eq!(assertions[0].valid_to, Some(common::TEST_TIME), "{key} should be closed");
    }

    let change_event_id = second.change_event_id.expect("change event");
    assert_eq!(graph.edges_from(change_event_id.as_str(), "CLOSED_ASSERTION"), 3);
}

#[test]
fn relationships_create_assertions_between_entities() {
    let graph = Arc::new(MemoryGraph::new());
    let book = workbook(
        "Storage",
        vec![
            vec![text("Item Code"), text("Location")],
            vec![text("ITM001"), text("LOC9")],
        ],
    );
    let result = import(&graph, &book, &storage_spec());

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.entities_created, 2);
    assert_eq!(result.stats.relationships_created, 1);
    // Two property assertions (one key column each) plus the relationship.
    assert_eq!(result.stats.assertions_created, 3);

    let rels = graph.assertions_for_key("acme:Item:ITM001:STORED_AT:Location:LOC9");
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].relationship_type, "STORED_AT");
    assert!(rels[0].property_key.is_none());

    // Edges run from_entity -> assertion -> to_entity.
    let state = graph.state();
    let item = state.entities.iter().find(|e| e.primary_key == "ITM001").expect("item");
    let location = state.entities.iter().find(|e| e.primary_key == "LOC9").expect("location");
    let assertion_id = rels[0].assertion_id.as_str();
    assert!(state.edges.iter().any(|edge| {
        edge.src_id == item.entity_id.as_str() && edge.dst_id == assertion_id
    }));
    assert!(state.edges.iter().any(|edge| {
        edge.src_id == assertion_id && edge.dst_id == location.entity_id.as_str()
    }));
}

#[test]
fn relationship_reimport_is_unchanged() {
    let graph = Arc::new(MemoryGraph::new());
    let book = workbook(
        "Storage",
        vec![
            vec![text("Item Code"), text("Location")],
            vec![text("ITM001"), text("LOC9")],
        ],
    );
    import(&graph, &book, &storage_spec());
    let second = import(&graph, &book, &storage_spec());

    assert_eq!(second.stats.relationships_created, 0);
    assert_eq!(second.stats.assertions_unchanged, 3);
}

#[test]
fn failed_import_run_insert_aborts_without_side_effects() {
    let graph = Arc::new(MemoryGraph::new());
    graph.fail_import_run_inserts();

    let result = import(&graph, &items_workbook(), &items_spec());
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.errors.len(), 1);

    let state = graph.state();
    assert!(state.entities.is_empty());
    assert!(state.assertions.is_empty());
    assert!(state.change_events.is_empty());
}

#[test]
fn per_row_port_failures_do_not_abort_the_run() {
    let graph = Arc::new(MemoryGraph::new());
    graph.fail_property_value_inserts();

    let result = import(&graph, &items_workbook(), &items_spec());
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.errors, 6);
    assert_eq!(result.errors.len(), 6);

    let state = graph.state();
    assert_eq!(state.entities.len(), 2);
    assert!(state.assertions.is_empty());
}

#[test]
fn cancellation_finalizes_the_run_as_failed() {
    let graph = Arc::new(MemoryGraph::new());
    let cancel = CancelToken::new();
    cancel.cancel();

    let engine = IngestionEngine::new(Arc::clone(&graph) as Arc<dyn GraphPort>, test_clock());
    let result = engine.run_import(
        &acme(),
        WorkbookInput::Parsed(&items_workbook()),
        &items_spec(),
        None,
        None,
        &cancel,
    );

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.errors, vec!["cancelled".to_string()]);
    let state = graph.state();
    assert_eq!(state.import_runs[0].status, RunStatus::Failed);
    assert_eq!(state.import_runs[0].error_message.as_deref(), Some("cancelled"));
}

#[test]
fn unreadable_workbook_json_fails_the_run() {
    let graph = Arc::new(MemoryGraph::new());
    let engine = IngestionEngine::new(Arc::clone(&graph) as Arc<dyn GraphPort>, test_clock());
    let result = engine.run_import(
        &acme(),
        WorkbookInput::Json("not a workbook"),
        &items_spec(),
        None,
        None,
        &CancelToken::new(),
    );

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.errors[0].contains("workbook unreadable"));
    let state = graph.state();
    assert_eq!(state.import_runs[0].status, RunStatus::Failed);
}

#[test]
fn workbook_json_input_imports_like_parsed_input() {
    let graph = Arc::new(MemoryGraph::new());
    let json = serde_json::to_string(&items_workbook()).expect("encode");
    let engine = IngestionEngine::new(Arc::clone(&graph) as Arc<dyn GraphPort>, test_clock());
    let result = engine.run_import(
        &acme(),
        WorkbookInput::Json(&json),
        &items_spec(),
        None,
        None,
        &CancelToken::new(),
    );

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.assertions_created, 6);
}
