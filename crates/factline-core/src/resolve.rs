// crates/factline-core/src/resolve.rs
// ============================================================================
// Module: Factline Resolved View Engine
// Description: Deterministic conflict resolution across competing assertions.
// Purpose: Pick at most one winning assertion per assertion key.
// Dependencies: serde, time, crate::core
// ============================================================================

//! ## Overview
//! Competing claims share an assertion key. Resolution narrows the
//! candidate set through a strict pipeline: temporal filter, scenario
//! preference, manual override, then ordering by authority rank
//! (ascending), recency (descending), confidence (descending), and
//! finally the assertion identifier so that equal inputs produce equal
//! winners under any argument ordering. Resolution is a pure function of
//! its inputs; it performs no store access and no randomness.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::records::AssertionRecord;
use crate::core::records::BASE_SCENARIO;
use crate::core::records::SourceType;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Authority rank assigned to assertions whose source is unknown.
pub const UNKNOWN_AUTHORITY_RANK: i64 = 999;

// ============================================================================
// SECTION: Resolution Pipeline
// ============================================================================

/// Keeps assertions valid at `at_time`; identity when `at_time` is
/// `None`.
fn filter_temporal<'a>(
    assertions: &[&'a AssertionRecord],
    at_time: Option<OffsetDateTime>,
) -> Vec<&'a AssertionRecord> {
    let Some(at) = at_time else {
        return assertions.to_vec();
    };
    assertions
        .iter()
        .filter(|a| a.valid_from <= at && a.valid_to.is_none_or(|end| end > at))
        .copied()
        .collect()
}

/// Prefers assertions in the target scenario, falling back to `base`
/// when the target is an overlay with no candidates.
fn filter_scenario<'a>(
    assertions: Vec<&'a AssertionRecord>,
    scenario_id: &str,
) -> Vec<&'a AssertionRecord> {
    let in_target: Vec<&AssertionRecord> = assertions
        .iter()
        .filter(|a| a.scenario_id == scenario_id)
        .copied()
        .collect();
    if !in_target.is_empty() {
        return in_target;
    }
    if scenario_id != BASE_SCENARIO {
        return assertions
            .into_iter()
            .filter(|a| a.scenario_id == BASE_SCENARIO)
            .collect();
    }
    assertions
}

/// Looks up the authority rank for an assertion's source.
fn authority_rank(assertion: &AssertionRecord, authority: &BTreeMap<String, i64>) -> i64 {
    assertion
        .source_id
        .as_ref()
        .and_then(|source| authority.get(source.as_str()))
        .copied()
        .unwrap_or(UNKNOWN_AUTHORITY_RANK)
}

/// Total ordering over candidates: authority rank ascending, recency
/// descending, confidence descending, assertion id ascending.
fn compare_candidates(
    left: &AssertionRecord,
    right: &AssertionRecord,
    authority: &BTreeMap<String, i64>,
) -> Ordering {
    authority_rank(left, authority)
        .cmp(&authority_rank(right, authority))
        .then_with(|| right.recorded_at.cmp(&left.recorded_at))
        .then_with(|| right.confidence.total_cmp(&left.confidence))
        .then_with(|| left.assertion_id.as_str().cmp(right.assertion_id.as_str()))
}

/// Resolves a set of competing assertions to a single winner.
///
/// All assertions are expected to share one assertion key; the function
/// does not enforce this. Returns `None` when no candidate survives the
/// temporal and scenario filters.
#[must_use]
pub fn resolve_assertion<'a>(
    assertions: &[&'a AssertionRecord],
    scenario_id: &str,
    at_time: Option<OffsetDateTime>,
    authority: &BTreeMap<String, i64>,
) -> Option<&'a AssertionRecord> {
    let candidates = filter_temporal(assertions, at_time);
    if candidates.is_empty() {
        return None;
    }

    let candidates = filter_scenario(candidates, scenario_id);
    if candidates.is_empty() {
        return None;
    }

    let manual: Vec<&AssertionRecord> = candidates
        .iter()
        .filter(|a| a.source_type == SourceType::Manual)
        .copied()
        .collect();
    let candidates = if manual.is_empty() { candidates } else { manual };

    candidates
        .into_iter()
        .min_by(|left, right| compare_candidates(left, right, authority))
}

/// Resolves every assertion key present in the input to its winner.
///
/// Returns a map from assertion key to the winning assertion. Keys whose
/// candidates are all filtered out are absent from the result, so the
/// surfaced key set is always a subset of the input's.
#[must_use]
pub fn resolve_entity_view(
    assertions: &[AssertionRecord],
    scenario_id: &str,
    at_time: Option<OffsetDateTime>,
    authority: &BTreeMap<String, i64>,
) -> BTreeMap<String, AssertionRecord> {
    let mut grouped: BTreeMap<&str, Vec<&AssertionRecord>> = BTreeMap::new();
    for assertion in assertions {
        grouped
            .entry(assertion.assertion_key.as_str())
            .or_default()
            .push(assertion);
    }

    let mut resolved = BTreeMap::new();
    for (key, group) in grouped {
        if let Some(winner) = resolve_assertion(&group, scenario_id, at_time, authority) {
            resolved.insert(key.to_string(), winner.clone());
        }
    }
    resolved
}

// ============================================================================
// SECTION: All Claims View
// ============================================================================

/// An assertion annotated with whether it wins its assertion key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// The underlying assertion.
    #[serde(flatten)]
    pub assertion: AssertionRecord,
    /// True when this assertion is the resolved winner for its key.
    pub is_winner: bool,
}

/// Returns every input assertion annotated with an `is_winner` flag.
///
/// Winners are computed with [`resolve_entity_view`] over the same
/// inputs; output order follows input order.
#[must_use]
pub fn get_all_claims(
    assertions: &[AssertionRecord],
    scenario_id: &str,
    at_time: Option<OffsetDateTime>,
    authority: &BTreeMap<String, i64>,
) -> Vec<Claim> {
    let winners = resolve_entity_view(assertions, scenario_id, at_time, authority);
    let winner_ids: Vec<&str> = winners
        .values()
        .map(|winner| winner.assertion_id.as_str())
        .collect();

    assertions
        .iter()
        .map(|assertion| Claim {
            assertion: assertion.clone(),
            is_winner: winner_ids.contains(&assertion.assertion_id.as_str()),
        })
        .collect()
}
