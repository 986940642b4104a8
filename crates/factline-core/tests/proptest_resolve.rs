// crates/factline-core/tests/proptest_resolve.rs
// ============================================================================
// Module: Resolution Property Tests
// Description: Property-based checks of resolution determinism.
// ============================================================================
//! ## Overview
//! Resolution must be a pure function of its inputs: any permutation of
//! the candidate list yields the same winner, and the winner always
//! satisfies the documented ordering against every other surviving
//! candidate.

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

use std::collections::BTreeMap;

use factline_core::AssertionId;
use factline_core::AssertionRecord;
use factline_core::HAS_PROPERTY;
use factline_core::SourceId;
use factline_core::SourceType;
use factline_core::WorkspaceId;
use factline_core::resolve_assertion;
use proptest::prelude::*;
use time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;

/// Base instant used across the generated assertions.
const T0: OffsetDateTime = datetime!(2024-01-15 10:00:00 UTC);

/// Generates one assertion with varying provenance dimensions.
fn arb_assertion(index: usize) -> impl Strategy<Value = AssertionRecord> {
    (
        prop_oneof![Just(None), Just(Some("src_a")), Just(Some("src_b")), Just(Some("src_c"))],
        0_i64 .. 120,
        prop_oneof![
            Just(SourceType::Excel),
            Just(SourceType::Api),
            Just(SourceType::Manual)
        ],
        prop_oneof![Just(0.25_f64), Just(0.5), Just(0.75), Just(1.0)],
    )
        .prop_map(move |(source, minutes, source_type, confidence)| AssertionRecord {
            assertion_id: AssertionId::new(format!("asrt_{index:04}")),
            workspace_id: WorkspaceId::new("acme").expect("workspace"),
            assertion_key: "k".to_string(),
            raw_hash: "rh".to_string(),
            normalized_hash: "nh".to_string(),
            source_type,
            source_ref: None,
            source_id: source.map(SourceId::new),
            import_run_id: None,
            recorded_at: T0 + Duration::minutes(minutes),
            valid_from: T0,
            valid_to: None,
            scenario_id: "base".to_string(),
            confidence,
            supersedes: None,
            relationship_type: HAS_PROPERTY.to_string(),
            property_key: Some("price".to_string()),
        })
}

/// Generates a small candidate pool with distinct identifiers.
fn arb_pool() -> impl Strategy<Value = Vec<AssertionRecord>> {
    (1_usize ..= 6).prop_flat_map(|len| {
        (0 .. len).map(arb_assertion).collect::<Vec<_>>()
    })
}

/// Authority map shared by the property tests.
fn authority() -> BTreeMap<String, i64> {
    BTreeMap::from([
        ("src_a".to_string(), 1),
        ("src_b".to_string(), 5),
        ("src_c".to_string(), 5),
    ])
}

proptest! {
    #[test]
    fn winner_is_permutation_invariant(pool in arb_pool(), seed in any::<u64>()) {
        let authority = authority();
        let refs: Vec<&AssertionRecord> = pool.iter().collect();
        let baseline = resolve_assertion(&refs, "base", None, &authority)
            .map(|winner| winner.assertion_id.clone());

        // Deterministic pseudo-shuffle driven by the seed.
        let mut shuffled = refs.clone();
        let mut state = seed;
        for i in (1 .. shuffled.len()).rev() {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            #[allow(clippy::cast_possible_truncation, reason = "modulo keeps the value in range")]
            let j = (state % (i as u64 + 1)) as usize;
            shuffled.swap(i, j);
        }
        let permuted = resolve_assertion(&shuffled, "base", None, &authority)
            .map(|winner| winner.assertion_id.clone());

        prop_assert_eq!(baseline, permuted);
    }

    #[test]
    fn winner_dominates_surviving_candidates(pool in arb_pool()) {
        let authority = authority();
        let refs: Vec<&AssertionRecord> = pool.iter().collect();
        let Some(winner) = resolve_assertion(&refs, "base", None, &authority) else {
            return Ok(());
        };

        let any_manual = pool.iter().any(|a| a.source_type == SourceType::Manual);
        if any_manual {
            prop_assert_eq!(winner.source_type, SourceType::Manual);
        }

        let rank = |a: &AssertionRecord| {
            a.source_id
                .as_ref()
                .and_then(|source| authority.get(source.as_str()))
                .copied()
                .unwrap_or(999)
        };
        for candidate in &pool {
            if any_manual && candidate.source_type != SourceType::Manual {
                continue;
            }
            prop_assert!(rank(winner) <= rank(candidate));
            if rank(winner) == rank(candidate) {
                prop_assert!(winner.recorded_at >= candidate.recorded_at);
            }
        }
    }
}
