// crates/factline-ingest/src/view.rs
// ============================================================================
// Module: Factline Entity Views
// Description: Resolved and all-claims projections of one entity.
// Purpose: Assemble the query surface over assertions and the resolver.
// Dependencies: factline-core, serde, time
// ============================================================================

//! ## Overview
//! An entity view projects every assertion attached to an entity into
//! property and relationship rows. In `resolved` mode only the winning
//! assertion per key appears; in `all_claims` mode every assertion
//! appears with an `is_winner` flag so callers can show competing
//! claims side by side.

// ============================================================================
// SECTION: Imports
// ============================================================================

use factline_core::AssertionRecord;
use factline_core::EntityId;
use factline_core::GraphPort;
use factline_core::PortError;
use factline_core::PropertyValueId;
use factline_core::WorkspaceId;
use factline_core::get_all_claims;
use factline_core::resolve_entity_view;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

// ============================================================================
// SECTION: View Types
// ============================================================================

/// Projection mode for entity views.
///
/// # Invariants
/// - Wire form is the lowercase name; the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// One winning claim per assertion key.
    #[default]
    Resolved,
    /// Every claim, annotated with the winner flag.
    AllClaims,
}

/// One property row of an entity view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyView {
    /// Property key.
    pub property_key: String,
    /// Stored value rendered as text.
    pub value: Option<String>,
    /// Declared value type label.
    pub value_type: String,
    /// Human-readable trace of the claim.
    pub source_ref: Option<String>,
    /// Backing assertion identifier.
    pub assertion_id: String,
    /// Claim confidence.
    pub confidence: f64,
    /// True when this claim wins its assertion key.
    pub is_winner: bool,
}

/// One relationship row of an entity view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipView {
    /// Domain relationship type.
    pub relationship_type: String,
    /// Target entity identifier.
    pub target_entity_id: String,
    /// Target entity type.
    pub target_entity_type: String,
    /// Target entity primary key.
    pub target_primary_key: String,
    /// Target entity display name.
    pub target_display_name: Option<String>,
    /// Backing assertion identifier.
    pub assertion_id: String,
    /// Human-readable trace of the claim.
    pub source_ref: Option<String>,
    /// Claim confidence.
    pub confidence: f64,
    /// True when this claim wins its assertion key.
    pub is_winner: bool,
}

/// A projected entity with its properties and relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
    /// Entity identifier.
    pub entity_id: String,
    /// Entity type.
    pub entity_type: String,
    /// Entity primary key.
    pub primary_key: String,
    /// Entity display name.
    pub display_name: Option<String>,
    /// Property rows.
    pub properties: Vec<PropertyView>,
    /// Relationship rows.
    pub relationships: Vec<RelationshipView>,
    /// Mode the view was produced under.
    pub view_mode: ViewMode,
}

// ============================================================================
// SECTION: View Assembly
// ============================================================================

/// Builds the property row for one property assertion.
fn property_row(
    port: &dyn GraphPort,
    assertion: &AssertionRecord,
    is_winner: bool,
) -> Result<Option<PropertyView>, PortError> {
    let Some(property_key) = assertion.property_key.clone() else {
        return Ok(None);
    };
    let target = port.get_asserted_rel_target(&assertion.assertion_id)?;
    let property_value = match target {
        Some(vid) => port.get_property_value(&PropertyValueId::new(vid))?,
        None => None,
    };
    let (value, value_type) = property_value
        .map_or((None, "string".to_string()), |record| {
            (record.value, record.value_type.as_str().to_string())
        });
    Ok(Some(PropertyView {
        property_key,
        value,
        value_type,
        source_ref: assertion.source_ref.clone(),
        assertion_id: assertion.assertion_id.as_str().to_string(),
        confidence: assertion.confidence,
        is_winner,
    }))
}

/// Builds the relationship row for one relationship assertion.
fn relationship_row(
    port: &dyn GraphPort,
    workspace_id: &WorkspaceId,
    assertion: &AssertionRecord,
    is_winner: bool,
) -> Result<Option<RelationshipView>, PortError> {
    let Some(target_vid) = port.get_asserted_rel_target(&assertion.assertion_id)? else {
        return Ok(None);
    };
    let Some(target) = port.get_entity(workspace_id, &EntityId::new(target_vid))? else {
        return Ok(None);
    };
    Ok(Some(RelationshipView {
        relationship_type: assertion.relationship_type.clone(),
        target_entity_id: target.entity_id.as_str().to_string(),
        target_entity_type: target.entity_type,
        target_primary_key: target.primary_key,
        target_display_name: target.display_name,
        assertion_id: assertion.assertion_id.as_str().to_string(),
        source_ref: assertion.source_ref.clone(),
        confidence: assertion.confidence,
        is_winner,
    }))
}

/// Appends view rows for one annotated assertion.
fn push_rows(
    port: &dyn GraphPort,
    workspace_id: &WorkspaceId,
    assertion: &AssertionRecord,
    is_winner: bool,
    view: &mut EntityView,
) -> Result<(), PortError> {
    if assertion.is_property() {
        if let Some(row) = property_row(port, assertion, is_winner)? {
            view.properties.push(row);
        }
    } else if let Some(row) = relationship_row(port, workspace_id, assertion, is_winner)? {
        view.relationships.push(row);
    }
    Ok(())
}

/// Projects one entity through the resolved view engine.
///
/// Returns `None` when the entity does not exist in the workspace.
///
/// # Errors
///
/// Returns [`PortError`] when the store is unavailable.
pub fn entity_view(
    port: &dyn GraphPort,
    workspace_id: &WorkspaceId,
    entity_id: &EntityId,
    mode: ViewMode,
    scenario_id: &str,
    at_time: Option<OffsetDateTime>,
) -> Result<Option<EntityView>, PortError> {
    let Some(entity) = port.get_entity(workspace_id, entity_id)? else {
        return Ok(None);
    };

    let assertions = port.get_assertions_for_entity(workspace_id, entity_id)?;
    let authority = port.get_source_authority_map(workspace_id)?;

    let mut view = EntityView {
        entity_id: entity.entity_id.as_str().to_string(),
        entity_type: entity.entity_type,
        primary_key: entity.primary_key,
        display_name: entity.display_name,
        properties: Vec::new(),
        relationships: Vec::new(),
        view_mode: mode,
    };

    match mode {
        ViewMode::Resolved => {
            let winners = resolve_entity_view(&assertions, scenario_id, at_time, &authority);
            for winner in winners.values() {
                push_rows(port, workspace_id, winner, true, &mut view)?;
            }
        }
        ViewMode::AllClaims => {
            let claims = get_all_claims(&assertions, scenario_id, at_time, &authority);
            for claim in &claims {
                push_rows(port, workspace_id, &claim.assertion, claim.is_winner, &mut view)?;
            }
        }
    }

    Ok(Some(view))
}
