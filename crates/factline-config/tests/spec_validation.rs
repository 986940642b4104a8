// crates/factline-config/tests/spec_validation.rs
// ============================================================================
// Module: Ingestion Spec Tests
// Description: Verifies spec parsing, defaults, validation, and loading.
// ============================================================================
//! ## Overview
//! Ingestion specs must parse with the documented defaults, reject
//! structural mistakes, and load from the specs directory by file stem.

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

use std::fs;

use factline_config::SpecError;
use factline_config::ingestion::parse_spec;
use factline_config::list_specs;
use factline_config::load_spec;
use factline_core::hashing::ChangeDetectionMode;

/// A minimal valid spec document.
const ITEMS_SPEC: &str = r#"
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
"#;

#[test]
fn parses_with_documented_defaults() {
    let spec = parse_spec(ITEMS_SPEC).expect("spec");
    assert_eq!(spec.spec_name, "items");
    assert_eq!(spec.source_type, "excel");
    assert_eq!(spec.raw_hash_serialization.delimiter, "|");
    assert_eq!(spec.raw_hash_serialization.null_representation, "<NULL>");
    assert_eq!(spec.change_detection.mode, ChangeDetectionMode::Normalized);
    assert!(
        spec.change_detection
            .normalization_rules
            .normalize_nulls
            .contains(&"N/A".to_string())
    );
    let sheet = &spec.sheets[0];
    assert_eq!(sheet.header_row, 0);
    assert!(sheet.skip_rows.is_empty());
    assert!(sheet.relationships.is_empty());
}

#[test]
fn rejects_invalid_workspace_id() {
    let yaml = ITEMS_SPEC.replace("workspace_id: acme", "workspace_id: Acme-Prod");
    let err = parse_spec(&yaml).expect_err("must fail");
    assert!(matches!(err, SpecError::Invalid(_)));
    assert!(err.to_string().contains("workspace_id"));
}

#[test]
fn rejects_spec_without_sheets() {
    let yaml = r#"
spec_name: empty
spec_version: "1"
workspace_id: acme
sheets: []
"#;
    let err = parse_spec(yaml).expect_err("must fail");
    assert!(err.to_string().contains("at least one sheet"));
}

#[test]
fn rejects_key_column_not_mapped() {
    let yaml = ITEMS_SPEC.replace("key_columns: [item_code]", "key_columns: [sku]");
    let err = parse_spec(&yaml).expect_err("must fail");
    assert!(err.to_string().contains("key column 'sku'"));
}

#[test]
fn rejects_unknown_relationship_endpoint() {
    let yaml = format!(
        "{ITEMS_SPEC}    relationships:\n      - relationship_type: STORED_AT\n        from_entity: item\n        to_entity: location\n"
    );
    let err = parse_spec(&yaml).expect_err("must fail");
    assert!(err.to_string().contains("to_entity 'location'"));
}

#[test]
fn rejects_malformed_yaml() {
    let err = parse_spec("spec_name: [unclosed").expect_err("must fail");
    assert!(matches!(err, SpecError::Parse(_)));
}

#[test]
fn strict_mode_parses() {
    let yaml = format!("{ITEMS_SPEC}change_detection:\n  mode: strict\n");
    let spec = parse_spec(&yaml).expect("spec");
    assert_eq!(spec.change_detection.mode, ChangeDetectionMode::Strict);
}

#[test]
fn loads_spec_by_file_stem() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("items.yaml"), ITEMS_SPEC).expect("write");

    let spec = load_spec(dir.path(), "items").expect("spec");
    assert_eq!(spec.spec_name, "items");
}

#[test]
fn missing_spec_file_reports_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_spec(dir.path(), "absent").expect_err("must fail");
    assert!(matches!(err, SpecError::NotFound(_)));
}

#[test]
fn list_specs_skips_disabled_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("items.yaml"), ITEMS_SPEC).expect("write");
    fs::write(dir.path().join("_draft.yaml"), ITEMS_SPEC).expect("write");
    fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

    assert_eq!(list_specs(dir.path()), vec!["items".to_string()]);
}

#[test]
fn list_specs_handles_missing_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope");
    assert!(list_specs(&missing).is_empty());
}
