// crates/factline-ingest/src/engine.rs
// ============================================================================
// Module: Factline Ingestion Engine
// Description: Orchestrates a full import run under one import run id.
// Purpose: Parse, upsert, diff, detect disappearances, and emit the change
//          event for one tabular source.
// Dependencies: factline-config, factline-core, serde, serde_json, time,
//               tracing
// ============================================================================

//! ## Overview
//! One call to [`IngestionEngine::run_import`] executes the whole
//! pipeline: create the import run, parse the workbook, upsert entities,
//! process property then relationship assertions with dual-hash change
//! detection, close assertions that disappeared since the previous run
//! of the same spec, and record one change event for everything created
//! or closed.
//!
//! The engine never returns an error across its public boundary; the
//! outcome is always an [`ImportResult`] whose status and error list
//! describe what happened. Port failures inside the per-entity and
//! per-relationship loops are counted and collected without aborting
//! the run; failures anywhere else finalize the run as failed.
//!
//! Runs on the same workspace must not execute concurrently. The engine
//! serializes runs within one process; cross-process callers must
//! serialize externally (for example with an advisory lock keyed on the
//! workspace).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use factline_config::IngestionSpec;
use factline_core::AssertionId;
use factline_core::AssertionRecord;
use factline_core::BASE_SCENARIO;
use factline_core::Cell;
use factline_core::ChangeEvent;
use factline_core::ChangeEventId;
use factline_core::EntityId;
use factline_core::EventType;
use factline_core::GraphPort;
use factline_core::HAS_PROPERTY;
use factline_core::IdGenerator;
use factline_core::ImportRun;
use factline_core::ImportRunId;
use factline_core::ImportRunUpdate;
use factline_core::PropertyValue;
use factline_core::RunStatus;
use factline_core::SharedClock;
use factline_core::SourceId;
use factline_core::SourceType;
use factline_core::ValueType;
use factline_core::WorkspaceId;
use factline_core::hashing::ChangeDetectionMode;
use factline_core::hashing::compute_property_normalized_hash;
use factline_core::hashing::compute_property_raw_hash;
use factline_core::hashing::property_assertion_key;
use factline_core::hashing::relationship_assertion_key;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::parser::StagedRelationship;
use crate::parser::StagedRow;
use crate::parser::parse_workbook;
use crate::workbook::Workbook;

// ============================================================================
// SECTION: Run Inputs
// ============================================================================

/// Workbook input accepted by a run.
#[derive(Debug, Clone, Copy)]
pub enum WorkbookInput<'a> {
    /// Already-decoded workbook.
    Parsed(&'a Workbook),
    /// JSON interchange form, decoded inside the run so decode failures
    /// finalize the run as failed.
    Json(&'a str),
}

/// Cooperative cancellation token honored between pipeline steps.
///
/// # Invariants
/// - Cancellation is sticky; a cancelled token never un-cancels.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    /// Shared cancellation flag.
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true when cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Run Outputs
// ============================================================================

/// Counters tracked across one import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportStats {
    /// Entities inserted for the first time.
    pub entities_created: u64,
    /// Entities already present before the run.
    pub entities_existing: u64,
    /// Assertions created for previously unseen keys.
    pub assertions_created: u64,
    /// Assertions closed by disappearance detection.
    pub assertions_closed: u64,
    /// Assertions replaced because their hash changed.
    pub assertions_modified: u64,
    /// Assertions left untouched because their hash matched.
    pub assertions_unchanged: u64,
    /// Relationship assertions created.
    pub relationships_created: u64,
    /// Per-row port failures recorded without aborting the run.
    pub errors: u64,
}

/// Result of one import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Identifier of the run.
    pub import_run_id: ImportRunId,
    /// Final run status.
    pub status: RunStatus,
    /// Counters accumulated by the run.
    pub stats: ImportStats,
    /// Per-row error messages; non-empty runs can still complete.
    pub errors: Vec<String>,
    /// Change event recorded for the run, when anything changed.
    pub change_event_id: Option<ChangeEventId>,
}

// ============================================================================
// SECTION: Run Scratch State
// ============================================================================

/// Mutable state owned by a single run.
struct RunScratch {
    /// Counters accumulated so far.
    stats: ImportStats,
    /// Per-row error messages.
    errors: Vec<String>,
    /// Assertions created by this run, in write order.
    created_ids: Vec<AssertionId>,
    /// Assertions closed by this run, in write order.
    closed_ids: Vec<AssertionId>,
    /// Every assertion key touched by this run.
    seen_keys: BTreeSet<String>,
    /// Entity ids resolved during the upsert pass, keyed by
    /// `(entity_type, primary_key)`.
    entity_vid_map: BTreeMap<(String, String), EntityId>,
}

impl RunScratch {
    /// Creates empty scratch state.
    fn new() -> Self {
        Self {
            stats: ImportStats::default(),
            errors: Vec::new(),
            created_ids: Vec::new(),
            closed_ids: Vec::new(),
            seen_keys: BTreeSet::new(),
            entity_vid_map: BTreeMap::new(),
        }
    }
}

/// Fatal condition aborting a run outside the per-item loops.
struct RunAbort(String);

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Orchestrator for import runs against one graph port.
pub struct IngestionEngine {
    /// Storage port receiving all reads and writes.
    port: Arc<dyn GraphPort>,
    /// Clock supplying the run timestamp.
    clock: SharedClock,
    /// Identifier generator for every vertex the run creates.
    ids: IdGenerator,
    /// Per-workspace in-process run serialization.
    workspace_locks: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
}

impl IngestionEngine {
    /// Creates an engine over a port and clock.
    #[must_use]
    pub fn new(port: Arc<dyn GraphPort>, clock: SharedClock) -> Self {
        let ids = IdGenerator::new(Arc::clone(&clock));
        Self {
            port,
            clock,
            ids,
            workspace_locks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the lock guarding runs for one workspace.
    fn workspace_lock(&self, workspace_id: &WorkspaceId) -> Arc<Mutex<()>> {
        match self.workspace_locks.lock() {
            Ok(mut locks) => Arc::clone(
                locks
                    .entry(workspace_id.as_str().to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            ),
            Err(poisoned) => {
                let mut locks = poisoned.into_inner();
                Arc::clone(
                    locks
                        .entry(workspace_id.as_str().to_string())
                        .or_insert_with(|| Arc::new(Mutex::new(()))),
                )
            }
        }
    }

    /// Runs a full import of one workbook under one import run.
    ///
    /// Never returns an error; the [`ImportResult`] carries the outcome.
    /// Concurrent calls for the same workspace serialize within this
    /// process; cross-process callers must serialize externally.
    #[must_use]
    pub fn run_import(
        &self,
        workspace_id: &WorkspaceId,
        workbook: WorkbookInput<'_>,
        spec: &IngestionSpec,
        source_id: Option<&SourceId>,
        source_file: Option<&str>,
        cancel: &CancelToken,
    ) -> ImportResult {
        let lock = self.workspace_lock(workspace_id);
        let _guard = lock.lock();

        let now = self.clock.now();
        let import_run_id = self.ids.import_run_id();
        let mut scratch = RunScratch::new();

        let run = ImportRun {
            import_run_id: import_run_id.clone(),
            workspace_id: workspace_id.clone(),
            source_file: source_file.map(ToString::to_string),
            spec_name: Some(spec.spec_name.clone()),
            started_at: now,
            completed_at: None,
            status: RunStatus::Running,
            stats: None,
            error_message: None,
        };
        if let Err(err) = self.port.insert_import_run(&run) {
            error!(import_run = %import_run_id, error = %err, "failed to create import run");
            return ImportResult {
                import_run_id,
                status: RunStatus::Failed,
                stats: scratch.stats,
                errors: vec![err.to_string()],
                change_event_id: None,
            };
        }

        match self.execute(workspace_id, workbook, spec, source_id, &import_run_id, now, cancel, &mut scratch)
        {
            Ok(change_event_id) => {
                let stats_json = stats_json(&scratch.stats);
                if let Err(err) = self.port.update_import_run(
                    &import_run_id,
                    &ImportRunUpdate {
                        status: Some(RunStatus::Completed),
                        completed_at: Some(self.clock.now()),
                        stats: Some(stats_json),
                        error_message: None,
                    },
                ) {
                    warn!(import_run = %import_run_id, error = %err, "failed to finalize import run");
                    scratch.errors.push(err.to_string());
                }
                info!(
                    import_run = %import_run_id,
                    created = scratch.stats.assertions_created,
                    modified = scratch.stats.assertions_modified,
                    closed = scratch.stats.assertions_closed,
                    unchanged = scratch.stats.assertions_unchanged,
                    "import run completed"
                );
                ImportResult {
                    import_run_id,
                    status: RunStatus::Completed,
                    stats: scratch.stats,
                    errors: scratch.errors,
                    change_event_id,
                }
            }
            Err(RunAbort(message)) => {
                error!(import_run = %import_run_id, error = %message, "import run failed");
                if let Err(err) = self.port.update_import_run(
                    &import_run_id,
                    &ImportRunUpdate {
                        status: Some(RunStatus::Failed),
                        completed_at: Some(self.clock.now()),
                        stats: None,
                        error_message: Some(message.clone()),
                    },
                ) {
                    warn!(import_run = %import_run_id, error = %err, "failed to mark import run failed");
                }
                ImportResult {
                    import_run_id,
                    status: RunStatus::Failed,
                    stats: scratch.stats,
                    errors: vec![message],
                    change_event_id: None,
                }
            }
        }
    }

    /// Executes steps 2–7 of the pipeline.
    #[allow(clippy::too_many_arguments, reason = "run context threads through every step")]
    fn execute(
        &self,
        workspace_id: &WorkspaceId,
        workbook: WorkbookInput<'_>,
        spec: &IngestionSpec,
        source_id: Option<&SourceId>,
        import_run_id: &ImportRunId,
        now: OffsetDateTime,
        cancel: &CancelToken,
        scratch: &mut RunScratch,
    ) -> Result<Option<ChangeEventId>, RunAbort> {
        // Step 2: parse.
        check_cancelled(cancel)?;
        let decoded;
        let workbook = match workbook {
            WorkbookInput::Parsed(parsed) => parsed,
            WorkbookInput::Json(json) => {
                decoded = Workbook::from_json_str(json).map_err(|err| RunAbort(err.to_string()))?;
                &decoded
            }
        };
        let staged_rows = parse_workbook(workbook, spec);
        info!(rows = staged_rows.len(), spec = %spec.spec_name, "parsed staged rows");

        // Step 3: upsert entities.
        check_cancelled(cancel)?;
        self.upsert_entities(workspace_id, &staged_rows, scratch);

        // Step 4: property assertions.
        check_cancelled(cancel)?;
        self.process_properties(workspace_id, &staged_rows, spec, source_id, import_run_id, now, scratch);

        // Step 5: relationship assertions.
        check_cancelled(cancel)?;
        self.process_relationships(
            workspace_id,
            &staged_rows,
            spec,
            source_id,
            import_run_id,
            now,
            scratch,
        );

        // Step 6: disappearance detection.
        check_cancelled(cancel)?;
        self.detect_disappearances(workspace_id, spec, import_run_id, now, scratch)
            .map_err(|err| RunAbort(err.to_string()))?;

        // Step 7: change event.
        check_cancelled(cancel)?;
        self.record_change_event(workspace_id, import_run_id, now, scratch)
            .map_err(|err| RunAbort(err.to_string()))
    }

    /// Step 3: upserts every unique `(entity_type, primary_key)` and
    /// caches the resulting ids.
    fn upsert_entities(
        &self,
        workspace_id: &WorkspaceId,
        staged_rows: &[StagedRow],
        scratch: &mut RunScratch,
    ) {
        for row in staged_rows {
            for entity in &row.entities {
                let key = (entity.entity_type.clone(), entity.primary_key.clone());
                if scratch.entity_vid_map.contains_key(&key) {
                    continue;
                }
                match self.port.upsert_entity(
                    workspace_id,
                    &entity.entity_type,
                    &entity.primary_key,
                    entity.display_name.as_deref(),
                ) {
                    Ok(upsert) => {
                        if upsert.created {
                            scratch.stats.entities_created += 1;
                        } else {
                            scratch.stats.entities_existing += 1;
                        }
                        scratch.entity_vid_map.insert(key, upsert.entity_id);
                    }
                    Err(err) => {
                        scratch.errors.push(format!(
                            "entity upsert failed for {}:{}: {err}",
                            entity.entity_type, entity.primary_key
                        ));
                        scratch.stats.errors += 1;
                    }
                }
            }
        }
    }

    /// Step 4: processes every property assertion with change detection.
    #[allow(clippy::too_many_arguments, reason = "run context threads through every step")]
    fn process_properties(
        &self,
        workspace_id: &WorkspaceId,
        staged_rows: &[StagedRow],
        spec: &IngestionSpec,
        source_id: Option<&SourceId>,
        import_run_id: &ImportRunId,
        now: OffsetDateTime,
        scratch: &mut RunScratch,
    ) {
        for row in staged_rows {
            for entity in &row.entities {
                let entity_key = (entity.entity_type.clone(), entity.primary_key.clone());
                let Some(entity_id) = scratch.entity_vid_map.get(&entity_key).cloned() else {
                    continue;
                };

                for (property_key, value) in &entity.properties {
                    if let Err(err) = self.process_property_assertion(
                        workspace_id,
                        &entity_id,
                        &entity.entity_type,
                        &entity.primary_key,
                        property_key,
                        value,
                        &entity.source_ref,
                        spec,
                        source_id,
                        import_run_id,
                        now,
                        scratch,
                    ) {
                        scratch.errors.push(format!(
                            "property assertion failed: {}:{}:{property_key}: {err}",
                            entity.entity_type, entity.primary_key
                        ));
                        scratch.stats.errors += 1;
                    }
                }
            }
        }
    }

    /// Processes a single property assertion.
    #[allow(clippy::too_many_arguments, reason = "run context threads through every step")]
    fn process_property_assertion(
        &self,
        workspace_id: &WorkspaceId,
        entity_id: &EntityId,
        entity_type: &str,
        primary_key: &str,
        property_key: &str,
        value: &Cell,
        source_ref: &str,
        spec: &IngestionSpec,
        source_id: Option<&SourceId>,
        import_run_id: &ImportRunId,
        now: OffsetDateTime,
        scratch: &mut RunScratch,
    ) -> Result<(), factline_core::PortError> {
        let assertion_key =
            property_assertion_key(workspace_id.as_str(), entity_type, primary_key, property_key);
        scratch.seen_keys.insert(assertion_key.clone());

        let raw_hash = compute_property_raw_hash(value, &spec.raw_hash_serialization);
        let normalized_hash = compute_property_normalized_hash(
            value,
            &spec.raw_hash_serialization,
            &spec.change_detection.normalization_rules,
            ValueType::String,
        );

        let supersedes = match self.diff_existing(
            workspace_id,
            &assertion_key,
            &raw_hash,
            &normalized_hash,
            spec.change_detection.mode,
            now,
            scratch,
        )? {
            DiffOutcome::Unchanged => return Ok(()),
            DiffOutcome::Changed(supersedes) => Some(supersedes),
            DiffOutcome::New => None,
        };

        let property_value = PropertyValue {
            property_value_id: self.ids.property_value_id(),
            workspace_id: workspace_id.clone(),
            property_key: property_key.to_string(),
            value: value.display_text(),
            value_type: value.value_type(),
        };
        let property_value_id = self.port.insert_property_value(&property_value)?;

        let assertion = AssertionRecord {
            assertion_id: self.ids.assertion_id(),
            workspace_id: workspace_id.clone(),
            assertion_key,
            raw_hash,
            normalized_hash,
            source_type: SourceType::Excel,
            source_ref: Some(source_ref.to_string()),
            source_id: source_id.cloned(),
            import_run_id: Some(import_run_id.clone()),
            recorded_at: now,
            valid_from: now,
            valid_to: None,
            scenario_id: BASE_SCENARIO.to_string(),
            confidence: 1.0,
            supersedes,
            relationship_type: HAS_PROPERTY.to_string(),
            property_key: Some(property_key.to_string()),
        };
        let assertion_id = self.port.insert_assertion(&assertion)?;
        scratch.created_ids.push(assertion_id.clone());

        self.port
            .create_asserted_rel(entity_id.as_str(), &assertion_id, property_value_id.as_str())
    }

    /// Step 5: processes every relationship assertion.
    #[allow(clippy::too_many_arguments, reason = "run context threads through every step")]
    fn process_relationships(
        &self,
        workspace_id: &WorkspaceId,
        staged_rows: &[StagedRow],
        spec: &IngestionSpec,
        source_id: Option<&SourceId>,
        import_run_id: &ImportRunId,
        now: OffsetDateTime,
        scratch: &mut RunScratch,
    ) {
        for row in staged_rows {
            for relationship in &row.relationships {
                if let Err(err) = self.process_relationship_assertion(
                    workspace_id,
                    relationship,
                    spec,
                    source_id,
                    import_run_id,
                    now,
                    scratch,
                ) {
                    scratch.errors.push(format!(
                        "relationship assertion failed: {}: {err}",
                        relationship.relationship_type
                    ));
                    scratch.stats.errors += 1;
                }
            }
        }
    }

    /// Processes a single relationship assertion.
    ///
    /// The hashed "value" of a relationship is its assertion key: the
    /// relationship's identity is the claim itself.
    #[allow(clippy::too_many_arguments, reason = "run context threads through every step")]
    fn process_relationship_assertion(
        &self,
        workspace_id: &WorkspaceId,
        relationship: &StagedRelationship,
        spec: &IngestionSpec,
        source_id: Option<&SourceId>,
        import_run_id: &ImportRunId,
        now: OffsetDateTime,
        scratch: &mut RunScratch,
    ) -> Result<(), factline_core::PortError> {
        let from_key = (
            relationship.from_entity_type.clone(),
            relationship.from_primary_key.clone(),
        );
        let to_key = (
            relationship.to_entity_type.clone(),
            relationship.to_primary_key.clone(),
        );
        let (Some(from_id), Some(to_id)) = (
            scratch.entity_vid_map.get(&from_key).cloned(),
            scratch.entity_vid_map.get(&to_key).cloned(),
        ) else {
            return Ok(());
        };

        let assertion_key = relationship_assertion_key(
            workspace_id.as_str(),
            &relationship.from_entity_type,
            &relationship.from_primary_key,
            &relationship.relationship_type,
            &relationship.to_entity_type,
            &relationship.to_primary_key,
        );
        scratch.seen_keys.insert(assertion_key.clone());

        let key_cell = Cell::Text(assertion_key.clone());
        let raw_hash = compute_property_raw_hash(&key_cell, &spec.raw_hash_serialization);
        let normalized_hash = compute_property_normalized_hash(
            &key_cell,
            &spec.raw_hash_serialization,
            &spec.change_detection.normalization_rules,
            ValueType::String,
        );

        let supersedes = match self.diff_existing(
            workspace_id,
            &assertion_key,
            &raw_hash,
            &normalized_hash,
            spec.change_detection.mode,
            now,
            scratch,
        )? {
            DiffOutcome::Unchanged => return Ok(()),
            DiffOutcome::Changed(supersedes) => Some(supersedes),
            DiffOutcome::New => {
                scratch.stats.relationships_created += 1;
                None
            }
        };

        let assertion = AssertionRecord {
            assertion_id: self.ids.assertion_id(),
            workspace_id: workspace_id.clone(),
            assertion_key,
            raw_hash,
            normalized_hash,
            source_type: SourceType::Excel,
            source_ref: Some(relationship.source_ref.clone()),
            source_id: source_id.cloned(),
            import_run_id: Some(import_run_id.clone()),
            recorded_at: now,
            valid_from: now,
            valid_to: None,
            scenario_id: BASE_SCENARIO.to_string(),
            confidence: 1.0,
            supersedes,
            relationship_type: relationship.relationship_type.clone(),
            property_key: None,
        };
        let assertion_id = self.port.insert_assertion(&assertion)?;
        scratch.created_ids.push(assertion_id.clone());

        self.port
            .create_asserted_rel(from_id.as_str(), &assertion_id, to_id.as_str())
    }

    /// Compares the incoming hashes against the open assertions for a
    /// key, closing changed ones.
    #[allow(clippy::too_many_arguments, reason = "run context threads through every step")]
    fn diff_existing(
        &self,
        workspace_id: &WorkspaceId,
        assertion_key: &str,
        raw_hash: &str,
        normalized_hash: &str,
        mode: ChangeDetectionMode,
        now: OffsetDateTime,
        scratch: &mut RunScratch,
    ) -> Result<DiffOutcome, factline_core::PortError> {
        let existing =
            self.port
                .lookup_assertions_by_key(workspace_id, assertion_key, BASE_SCENARIO)?;

        let Some(first) = existing.first() else {
            scratch.stats.assertions_created += 1;
            return Ok(DiffOutcome::New);
        };

        let (incoming, stored) = match mode {
            ChangeDetectionMode::Strict => (raw_hash, first.raw_hash.as_str()),
            ChangeDetectionMode::Normalized => (normalized_hash, first.normalized_hash.as_str()),
        };
        if incoming == stored {
            scratch.stats.assertions_unchanged += 1;
            return Ok(DiffOutcome::Unchanged);
        }

        if existing.len() > 1 {
            warn!(
                assertion_key,
                open = existing.len(),
                "multiple open assertions for one key; closing all"
            );
        }
        let mut most_recent: Option<&AssertionRecord> = None;
        for old in &existing {
            self.port.close_assertion(&old.assertion_id, now)?;
            scratch.closed_ids.push(old.assertion_id.clone());
            if most_recent.is_none_or(|current| old.recorded_at > current.recorded_at) {
                most_recent = Some(old);
            }
        }
        scratch.stats.assertions_modified += 1;

        match most_recent {
            Some(record) => Ok(DiffOutcome::Changed(record.assertion_id.clone())),
            None => Ok(DiffOutcome::New),
        }
    }

    /// Step 6: closes still-open assertions from the previous completed
    /// run of the same spec whose keys were not seen this run.
    fn detect_disappearances(
        &self,
        workspace_id: &WorkspaceId,
        spec: &IngestionSpec,
        import_run_id: &ImportRunId,
        now: OffsetDateTime,
        scratch: &mut RunScratch,
    ) -> Result<(), factline_core::PortError> {
        let runs = self.port.list_import_runs(workspace_id, 50)?;
        let previous = runs.iter().find(|run| {
            run.spec_name.as_deref() == Some(spec.spec_name.as_str())
                && run.import_run_id != *import_run_id
                && run.status == RunStatus::Completed
        });
        let Some(previous) = previous else {
            return Ok(());
        };

        for assertion in self
            .port
            .lookup_assertions_by_import_run(&previous.import_run_id)?
        {
            if !assertion.is_open() {
                continue;
            }
            if scratch.seen_keys.contains(&assertion.assertion_key) {
                continue;
            }
            self.port.close_assertion(&assertion.assertion_id, now)?;
            scratch.closed_ids.push(assertion.assertion_id);
            scratch.stats.assertions_closed += 1;
        }
        Ok(())
    }

    /// Step 7: records one change event linking everything created or
    /// closed by the run. Returns `None` when nothing changed.
    fn record_change_event(
        &self,
        workspace_id: &WorkspaceId,
        import_run_id: &ImportRunId,
        now: OffsetDateTime,
        scratch: &mut RunScratch,
    ) -> Result<Option<ChangeEventId>, factline_core::PortError> {
        if scratch.created_ids.is_empty() && scratch.closed_ids.is_empty() {
            return Ok(None);
        }

        let stats = &scratch.stats;
        let description = format!(
            "Import run {import_run_id}: {} created, {} modified, {} closed, {} unchanged",
            stats.assertions_created,
            stats.assertions_modified,
            stats.assertions_closed,
            stats.assertions_unchanged
        );
        let diff_stats = serde_json::json!({
            "created": stats.assertions_created,
            "closed": stats.assertions_closed,
            "modified": stats.assertions_modified,
            "unchanged": stats.assertions_unchanged,
        });

        let change_event = ChangeEvent {
            change_event_id: self.ids.change_event_id(),
            workspace_id: workspace_id.clone(),
            event_type: EventType::ImportDiff,
            description: Some(description),
            ts: now,
            import_run_id: Some(import_run_id.clone()),
            actor: Some("system:import".to_string()),
            stats: Some(diff_stats.to_string()),
        };
        let change_event_id = self.port.insert_change_event(&change_event)?;

        self.port.link_triggered_by(&change_event_id, import_run_id)?;
        for assertion_id in &scratch.created_ids {
            self.port.link_created_assertion(&change_event_id, assertion_id)?;
        }
        for assertion_id in &scratch.closed_ids {
            self.port.link_closed_assertion(&change_event_id, assertion_id)?;
        }

        Ok(Some(change_event_id))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Outcome of diffing an incoming assertion against the open set.
enum DiffOutcome {
    /// Hash matched; nothing to write.
    Unchanged,
    /// Hash differed; the open set was closed and the new assertion
    /// supersedes the carried identifier.
    Changed(AssertionId),
    /// No open assertion existed for the key.
    New,
}

/// Returns a cancellation abort when the token fired.
fn check_cancelled(cancel: &CancelToken) -> Result<(), RunAbort> {
    if cancel.is_cancelled() {
        return Err(RunAbort("cancelled".to_string()));
    }
    Ok(())
}

/// Serializes the full stats block to its JSON string form.
fn stats_json(stats: &ImportStats) -> String {
    serde_json::to_string(stats).unwrap_or_else(|_| "{}".to_string())
}
