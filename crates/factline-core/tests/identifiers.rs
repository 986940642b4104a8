// crates/factline-core/tests/identifiers.rs
// ============================================================================
// Module: Identifier Tests
// Description: Verifies workspace validation and identifier generation.
// ============================================================================
//! ## Overview
//! Workspace identifiers must match `^[a-z0-9_]{1,64}$`. Generated vertex
//! identifiers carry their prefix, fit the 64-byte column, and sort by
//! generation order under a fixed clock.

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

use std::sync::Arc;

use factline_core::FixedClock;
use factline_core::IdGenerator;
use factline_core::SystemClock;
use factline_core::WorkspaceId;
use factline_core::WorkspaceIdError;
use time::macros::datetime;

#[test]
fn workspace_id_accepts_valid_values() {
    for value in ["acme", "acme_2024", "a", "w123_x"] {
        assert!(WorkspaceId::new(value).is_ok(), "{value} should be valid");
    }
}

#[test]
fn workspace_id_rejects_empty() {
    assert!(matches!(WorkspaceId::new(""), Err(WorkspaceIdError::Length(0))));
}

#[test]
fn workspace_id_rejects_over_64_bytes() {
    let long = "a".repeat(65);
    assert!(matches!(WorkspaceId::new(long), Err(WorkspaceIdError::Length(65))));
}

#[test]
fn workspace_id_accepts_exactly_64_bytes() {
    let exact = "a".repeat(64);
    assert!(WorkspaceId::new(exact).is_ok());
}

#[test]
fn workspace_id_rejects_invalid_characters() {
    for value in ["Acme", "acme-prod", "acme space", "acmé"] {
        assert!(
            matches!(WorkspaceId::new(value), Err(WorkspaceIdError::Character(_))),
            "{value} should be rejected"
        );
    }
}

#[test]
fn generated_ids_carry_their_prefix() {
    let ids = IdGenerator::new(Arc::new(SystemClock));
    assert!(ids.entity_id().as_str().starts_with("ent_"));
    assert!(ids.assertion_id().as_str().starts_with("asrt_"));
    assert!(ids.property_value_id().as_str().starts_with("pv_"));
    assert!(ids.change_event_id().as_str().starts_with("ce_"));
    assert!(ids.import_run_id().as_str().starts_with("ir_"));
    assert!(ids.source_id().as_str().starts_with("src_"));
}

#[test]
fn generated_ids_fit_the_identifier_column() {
    let ids = IdGenerator::new(Arc::new(SystemClock));
    let id = ids.assertion_id();
    assert_eq!(id.as_str().len(), "asrt_".len() + 32);
    assert!(id.as_str().len() <= 64);
    let payload = &id.as_str()["asrt_".len() ..];
    assert!(payload.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
}

#[test]
fn generated_ids_are_unique() {
    let ids = IdGenerator::new(Arc::new(SystemClock));
    let mut seen = std::collections::BTreeSet::new();
    for _ in 0 .. 1000 {
        assert!(seen.insert(ids.entity_id().as_str().to_string()));
    }
}

#[test]
fn generated_ids_sort_by_generation_order_under_fixed_clock() {
    let clock = FixedClock::new(datetime!(2024-01-15 10:00:00 UTC));
    let ids = IdGenerator::new(Arc::new(clock));
    let generated: Vec<String> = (0 .. 100)
        .map(|_| ids.entity_id().as_str().to_string())
        .collect();
    let mut sorted = generated.clone();
    sorted.sort();
    assert_eq!(generated, sorted);
}
