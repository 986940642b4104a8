// crates/factline-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Graph Store
// Description: Durable GraphPort implementation backed by SQLite WAL.
// Purpose: Persist vertices and edges with workspace scoping and parameter
//          binding for every user-supplied string.
// Dependencies: factline-core, rusqlite, serde, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! Each vertex tag maps to one table; every edge lands in a single
//! `edges` table keyed by `(src_id, dst_id, edge_type)`. All identifier
//! columns fit 64 bytes. User-supplied strings only ever reach SQLite as
//! bound parameters. Open-assertion filtering happens in Rust after the
//! keyed read: a NULL `valid_to` never appears in a query predicate.
//! Timestamps are stored as RFC 3339 text and parsed on read, failing
//! closed on corruption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use factline_core::AssertionId;
use factline_core::AssertionRecord;
use factline_core::ChangeEvent;
use factline_core::ChangeEventId;
use factline_core::Entity;
use factline_core::EntityId;
use factline_core::EntityUpsert;
use factline_core::EventType;
use factline_core::GraphPort;
use factline_core::IdGenerator;
use factline_core::ImportRun;
use factline_core::ImportRunId;
use factline_core::ImportRunUpdate;
use factline_core::LinkKind;
use factline_core::PortError;
use factline_core::PropertyValue;
use factline_core::PropertyValueId;
use factline_core::RunStatus;
use factline_core::SharedClock;
use factline_core::Source;
use factline_core::SourceId;
use factline_core::SourceType;
use factline_core::SystemClock;
use factline_core::ValueType;
use factline_core::WorkspaceId;
use factline_core::interfaces::EDGE_ASSERTED_REL;
use factline_core::interfaces::EDGE_TRIGGERED_BY;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Schema statements applied at open.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS entities (
    entity_id TEXT PRIMARY KEY CHECK (length(entity_id) <= 64),
    workspace_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    primary_key TEXT NOT NULL,
    display_name TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (workspace_id, entity_type, primary_key)
);
CREATE TABLE IF NOT EXISTS assertions (
    assertion_id TEXT PRIMARY KEY CHECK (length(assertion_id) <= 64),
    workspace_id TEXT NOT NULL,
    assertion_key TEXT NOT NULL,
    raw_hash TEXT NOT NULL,
    normalized_hash TEXT NOT NULL,
    source_type TEXT NOT NULL,
    source_ref TEXT,
    source_id TEXT,
    import_run_id TEXT,
    recorded_at TEXT NOT NULL,
    valid_from TEXT NOT NULL,
    valid_to TEXT,
    scenario_id TEXT NOT NULL,
    confidence REAL NOT NULL,
    supersedes TEXT,
    relationship_type TEXT NOT NULL,
    property_key TEXT
);
CREATE INDEX IF NOT EXISTS idx_assertions_key
    ON assertions (workspace_id, assertion_key, scenario_id);
CREATE INDEX IF NOT EXISTS idx_assertions_import_run
    ON assertions (import_run_id);
CREATE TABLE IF NOT EXISTS property_values (
    property_value_id TEXT PRIMARY KEY CHECK (length(property_value_id) <= 64),
    workspace_id TEXT NOT NULL,
    property_key TEXT NOT NULL,
    value TEXT,
    value_type TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS change_events (
    change_event_id TEXT PRIMARY KEY CHECK (length(change_event_id) <= 64),
    workspace_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    description TEXT,
    ts TEXT NOT NULL,
    import_run_id TEXT,
    actor TEXT,
    stats TEXT
);
CREATE TABLE IF NOT EXISTS import_runs (
    import_run_id TEXT PRIMARY KEY CHECK (length(import_run_id) <= 64),
    workspace_id TEXT NOT NULL,
    source_file TEXT,
    spec_name TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    stats TEXT,
    error_message TEXT
);
CREATE TABLE IF NOT EXISTS sources (
    source_id TEXT PRIMARY KEY CHECK (length(source_id) <= 64),
    workspace_id TEXT NOT NULL,
    source_name TEXT NOT NULL,
    source_type TEXT NOT NULL,
    authority_rank INTEGER NOT NULL,
    authority_domains TEXT,
    update_frequency TEXT,
    description TEXT
);
CREATE TABLE IF NOT EXISTS edges (
    src_id TEXT NOT NULL,
    dst_id TEXT NOT NULL,
    edge_type TEXT NOT NULL,
    description TEXT,
    PRIMARY KEY (src_id, dst_id, edge_type)
);
CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges (dst_id, edge_type);
";

/// Column list selected for assertion reads.
const ASSERTION_COLUMNS: &str = "assertion_id, workspace_id, assertion_key, raw_hash, \
     normalized_hash, source_type, source_ref, source_id, import_run_id, recorded_at, \
     valid_from, valid_to, scenario_id, confidence, supersedes, relationship_type, property_key";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` graph store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding full record payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data failed integrity or decode checks.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Invalid data handed to the store.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

impl From<SqliteStoreError> for PortError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Db(message) | SqliteStoreError::Invalid(message) => {
                Self::Unavailable(message)
            }
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
        }
    }
}

// ============================================================================
// SECTION: Timestamp Codec
// ============================================================================

/// Formats a timestamp into its stored RFC 3339 text.
fn format_timestamp(value: OffsetDateTime) -> Result<String, SqliteStoreError> {
    value
        .format(&Rfc3339)
        .map_err(|err| SqliteStoreError::Invalid(format!("unformattable timestamp: {err}")))
}

/// Parses a stored RFC 3339 timestamp.
fn parse_timestamp(text: &str) -> Result<OffsetDateTime, SqliteStoreError> {
    OffsetDateTime::parse(text, &Rfc3339)
        .map_err(|err| SqliteStoreError::Corrupt(format!("bad timestamp '{text}': {err}")))
}

/// Parses an optional stored timestamp.
fn parse_timestamp_opt(text: Option<&str>) -> Result<Option<OffsetDateTime>, SqliteStoreError> {
    text.map(parse_timestamp).transpose()
}

/// Parses a stored workspace identifier.
fn parse_workspace(text: &str) -> Result<WorkspaceId, SqliteStoreError> {
    WorkspaceId::new(text)
        .map_err(|err| SqliteStoreError::Corrupt(format!("bad workspace id '{text}': {err}")))
}

// ============================================================================
// SECTION: Raw Rows
// ============================================================================

/// Column values of one assertion row before decoding.
struct AssertionRow {
    /// `assertion_id` column.
    assertion_id: String,
    /// `workspace_id` column.
    workspace_id: String,
    /// `assertion_key` column.
    assertion_key: String,
    /// `raw_hash` column.
    raw_hash: String,
    /// `normalized_hash` column.
    normalized_hash: String,
    /// `source_type` column.
    source_type: String,
    /// `source_ref` column.
    source_ref: Option<String>,
    /// `source_id` column.
    source_id: Option<String>,
    /// `import_run_id` column.
    import_run_id: Option<String>,
    /// `recorded_at` column.
    recorded_at: String,
    /// `valid_from` column.
    valid_from: String,
    /// `valid_to` column.
    valid_to: Option<String>,
    /// `scenario_id` column.
    scenario_id: String,
    /// `confidence` column.
    confidence: f64,
    /// `supersedes` column.
    supersedes: Option<String>,
    /// `relationship_type` column.
    relationship_type: String,
    /// `property_key` column.
    property_key: Option<String>,
}

impl AssertionRow {
    /// Reads the raw row from a query result.
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            assertion_id: row.get(0)?,
            workspace_id: row.get(1)?,
            assertion_key: row.get(2)?,
            raw_hash: row.get(3)?,
            normalized_hash: row.get(4)?,
            source_type: row.get(5)?,
            source_ref: row.get(6)?,
            source_id: row.get(7)?,
            import_run_id: row.get(8)?,
            recorded_at: row.get(9)?,
            valid_from: row.get(10)?,
            valid_to: row.get(11)?,
            scenario_id: row.get(12)?,
            confidence: row.get(13)?,
            supersedes: row.get(14)?,
            relationship_type: row.get(15)?,
            property_key: row.get(16)?,
        })
    }

    /// Decodes the raw row into an assertion record.
    fn decode(self) -> Result<AssertionRecord, SqliteStoreError> {
        let source_type = SourceType::parse(&self.source_type).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("bad source_type '{}'", self.source_type))
        })?;
        Ok(AssertionRecord {
            assertion_id: AssertionId::new(self.assertion_id),
            workspace_id: parse_workspace(&self.workspace_id)?,
            assertion_key: self.assertion_key,
            raw_hash: self.raw_hash,
            normalized_hash: self.normalized_hash,
            source_type,
            source_ref: self.source_ref,
            source_id: self.source_id.map(SourceId::new),
            import_run_id: self.import_run_id.map(ImportRunId::new),
            recorded_at: parse_timestamp(&self.recorded_at)?,
            valid_from: parse_timestamp(&self.valid_from)?,
            valid_to: parse_timestamp_opt(self.valid_to.as_deref())?,
            scenario_id: self.scenario_id,
            confidence: self.confidence,
            supersedes: self.supersedes.map(AssertionId::new),
            relationship_type: self.relationship_type,
            property_key: self.property_key,
        })
    }
}

/// Column values of one entity row before decoding.
struct EntityRow {
    /// `entity_id` column.
    entity_id: String,
    /// `workspace_id` column.
    workspace_id: String,
    /// `entity_type` column.
    entity_type: String,
    /// `primary_key` column.
    primary_key: String,
    /// `display_name` column.
    display_name: Option<String>,
    /// `created_at` column.
    created_at: String,
    /// `updated_at` column.
    updated_at: String,
}

impl EntityRow {
    /// Reads the raw row from a query result.
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entity_id: row.get(0)?,
            workspace_id: row.get(1)?,
            entity_type: row.get(2)?,
            primary_key: row.get(3)?,
            display_name: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    /// Decodes the raw row into an entity record.
    fn decode(self) -> Result<Entity, SqliteStoreError> {
        Ok(Entity {
            entity_id: EntityId::new(self.entity_id),
            workspace_id: parse_workspace(&self.workspace_id)?,
            entity_type: self.entity_type,
            primary_key: self.primary_key,
            display_name: self.display_name,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Column values of one import run row before decoding.
struct ImportRunRow {
    /// `import_run_id` column.
    import_run_id: String,
    /// `workspace_id` column.
    workspace_id: String,
    /// `source_file` column.
    source_file: Option<String>,
    /// `spec_name` column.
    spec_name: Option<String>,
    /// `started_at` column.
    started_at: String,
    /// `completed_at` column.
    completed_at: Option<String>,
    /// `status` column.
    status: String,
    /// `stats` column.
    stats: Option<String>,
    /// `error_message` column.
    error_message: Option<String>,
}

impl ImportRunRow {
    /// Reads the raw row from a query result.
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            import_run_id: row.get(0)?,
            workspace_id: row.get(1)?,
            source_file: row.get(2)?,
            spec_name: row.get(3)?,
            started_at: row.get(4)?,
            completed_at: row.get(5)?,
            status: row.get(6)?,
            stats: row.get(7)?,
            error_message: row.get(8)?,
        })
    }

    /// Decodes the raw row into an import run record.
    fn decode(self) -> Result<ImportRun, SqliteStoreError> {
        let status = RunStatus::parse(&self.status)
            .ok_or_else(|| SqliteStoreError::Corrupt(format!("bad status '{}'", self.status)))?;
        Ok(ImportRun {
            import_run_id: ImportRunId::new(self.import_run_id),
            workspace_id: parse_workspace(&self.workspace_id)?,
            source_file: self.source_file,
            spec_name: self.spec_name,
            started_at: parse_timestamp(&self.started_at)?,
            completed_at: parse_timestamp_opt(self.completed_at.as_deref())?,
            status,
            stats: self.stats,
            error_message: self.error_message,
        })
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed graph store.
///
/// # Invariants
/// - Connection access is serialized through a mutex; writes issued by a
///   single caller apply in call order.
/// - Every user-supplied string reaches `SQLite` as a bound parameter.
pub struct SqliteGraphStore {
    /// Shared connection guarded by a mutex.
    connection: Mutex<Connection>,
    /// Generator for identifiers minted inside the store (entity upsert).
    ids: IdGenerator,
    /// Clock stamping entity creation times.
    clock: SharedClock,
}

impl SqliteGraphStore {
    /// Opens (or creates) a store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let connection = Connection::open(&config.path)?;
        Self::initialize(connection, config)
    }

    /// Opens an in-memory store, mainly for tests and demos.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when initialization fails.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let connection = Connection::open_in_memory()?;
        Self::initialize(
            connection,
            &SqliteStoreConfig {
                path: PathBuf::from(":memory:"),
                busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
                sync_mode: SqliteSyncMode::Normal,
            },
        )
    }

    /// Applies pragmas and schema, wrapping the connection.
    fn initialize(
        connection: Connection,
        config: &SqliteStoreConfig,
    ) -> Result<Self, SqliteStoreError> {
        // journal_mode returns the resulting mode as a row.
        connection.query_row("PRAGMA journal_mode = wal", [], |_row| Ok(()))?;
        connection.pragma_update(None, "synchronous", config.sync_mode.pragma_value())?;
        connection.pragma_update(None, "busy_timeout", i64::try_from(config.busy_timeout_ms).unwrap_or(i64::MAX))?;
        connection.pragma_update(None, "foreign_keys", "on")?;
        connection.execute_batch(SCHEMA_SQL)?;
        debug!(path = %config.path.display(), "sqlite graph store ready");
        let clock: SharedClock = Arc::new(SystemClock);
        Ok(Self {
            connection: Mutex::new(connection),
            ids: IdGenerator::new(Arc::clone(&clock)),
            clock,
        })
    }

    /// Locks the connection, absorbing poison into the guard.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.connection.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Reads assertions with a parameterized filter, decoding each row.
    fn query_assertions(
        &self,
        where_clause: &str,
        bindings: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<AssertionRecord>, SqliteStoreError> {
        let connection = self.lock();
        let sql =
            format!("SELECT {ASSERTION_COLUMNS} FROM assertions WHERE {where_clause} ORDER BY rowid");
        let mut statement = connection.prepare(&sql)?;
        let rows = statement.query_map(bindings, AssertionRow::read)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.decode()?);
        }
        Ok(records)
    }
}

// ============================================================================
// SECTION: GraphPort Implementation
// ============================================================================

impl GraphPort for SqliteGraphStore {
    fn upsert_entity(
        &self,
        workspace_id: &WorkspaceId,
        entity_type: &str,
        primary_key: &str,
        display_name: Option<&str>,
    ) -> Result<EntityUpsert, PortError> {
        if let Some(existing) = self.lookup_entity(workspace_id, entity_type, primary_key)? {
            return Ok(EntityUpsert {
                entity_id: existing.entity_id,
                created: false,
            });
        }

        let entity_id = self.ids.entity_id();
        let now = format_timestamp(self.clock.now()).map_err(PortError::from)?;
        let connection = self.lock();
        connection
            .execute(
                "INSERT INTO entities (entity_id, workspace_id, entity_type, primary_key, \
                 display_name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    entity_id.as_str(),
                    workspace_id.as_str(),
                    entity_type,
                    primary_key,
                    display_name,
                    now
                ],
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
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
        let connection = self.lock();
        let row = connection
            .query_row(
                "SELECT entity_id, workspace_id, entity_type, primary_key, display_name, \
                 created_at, updated_at FROM entities WHERE workspace_id = ?1 AND \
                 entity_type = ?2 AND primary_key = ?3",
                params![workspace_id.as_str(), entity_type, primary_key],
                EntityRow::read,
            )
            .optional()
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        row.map(EntityRow::decode)
            .transpose()
            .map_err(PortError::from)
    }

    fn get_entity(
        &self,
        workspace_id: &WorkspaceId,
        entity_id: &EntityId,
    ) -> Result<Option<Entity>, PortError> {
        let connection = self.lock();
        let row = connection
            .query_row(
                "SELECT entity_id, workspace_id, entity_type, primary_key, display_name, \
                 created_at, updated_at FROM entities WHERE entity_id = ?1 AND workspace_id = ?2",
                params![entity_id.as_str(), workspace_id.as_str()],
                EntityRow::read,
            )
            .optional()
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        row.map(EntityRow::decode)
            .transpose()
            .map_err(PortError::from)
    }

    fn search_entities(
        &self,
        workspace_id: &WorkspaceId,
        entity_type: Option<&str>,
        primary_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Entity>, PortError> {
        let connection = self.lock();
        let workspace = workspace_id.as_str();
        let mut sql = String::from(
            "SELECT entity_id, workspace_id, entity_type, primary_key, display_name, \
             created_at, updated_at FROM entities WHERE workspace_id = ?1",
        );
        let mut bindings: Vec<&dyn rusqlite::ToSql> = vec![&workspace];
        if let Some(entity_type) = &entity_type {
            sql.push_str(" AND entity_type = ?");
            sql.push_str(&(bindings.len() + 1).to_string());
            bindings.push(entity_type);
        }
        if let Some(primary_key) = &primary_key {
            sql.push_str(" AND primary_key = ?");
            sql.push_str(&(bindings.len() + 1).to_string());
            bindings.push(primary_key);
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        sql.push_str(" ORDER BY rowid LIMIT ?");
        sql.push_str(&(bindings.len() + 1).to_string());
        bindings.push(&limit);

        let mut statement = connection
            .prepare(&sql)
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let rows = statement
            .query_map(bindings.as_slice(), EntityRow::read)
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let mut entities = Vec::new();
        for row in rows {
            let raw = row.map_err(SqliteStoreError::from).map_err(PortError::from)?;
            entities.push(raw.decode().map_err(PortError::from)?);
        }
        Ok(entities)
    }

    fn insert_assertion(&self, assertion: &AssertionRecord) -> Result<AssertionId, PortError> {
        let recorded_at = format_timestamp(assertion.recorded_at).map_err(PortError::from)?;
        let valid_from = format_timestamp(assertion.valid_from).map_err(PortError::from)?;
        let valid_to = assertion
            .valid_to
            .map(format_timestamp)
            .transpose()
            .map_err(PortError::from)?;
        let connection = self.lock();
        connection
            .execute(
                "INSERT INTO assertions (assertion_id, workspace_id, assertion_key, raw_hash, \
                 normalized_hash, source_type, source_ref, source_id, import_run_id, recorded_at, \
                 valid_from, valid_to, scenario_id, confidence, supersedes, relationship_type, \
                 property_key) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, \
                 ?14, ?15, ?16, ?17)",
                params![
                    assertion.assertion_id.as_str(),
                    assertion.workspace_id.as_str(),
                    assertion.assertion_key,
                    assertion.raw_hash,
                    assertion.normalized_hash,
                    assertion.source_type.as_str(),
                    assertion.source_ref,
                    assertion.source_id.as_ref().map(SourceId::as_str),
                    assertion.import_run_id.as_ref().map(ImportRunId::as_str),
                    recorded_at,
                    valid_from,
                    valid_to,
                    assertion.scenario_id,
                    assertion.confidence,
                    assertion.supersedes.as_ref().map(AssertionId::as_str),
                    assertion.relationship_type,
                    assertion.property_key,
                ],
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        Ok(assertion.assertion_id.clone())
    }

    fn close_assertion(
        &self,
        assertion_id: &AssertionId,
        valid_to: OffsetDateTime,
    ) -> Result<(), PortError> {
        let valid_to = format_timestamp(valid_to).map_err(PortError::from)?;
        let connection = self.lock();
        connection
            .execute(
                "UPDATE assertions SET valid_to = ?1 WHERE assertion_id = ?2",
                params![valid_to, assertion_id.as_str()],
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        Ok(())
    }

    fn lookup_assertions_by_key(
        &self,
        workspace_id: &WorkspaceId,
        assertion_key: &str,
        scenario_id: &str,
    ) -> Result<Vec<AssertionRecord>, PortError> {
        // Keyed read only; the open-only filter applies after decoding.
        let records = self
            .query_assertions(
                "workspace_id = ?1 AND assertion_key = ?2 AND scenario_id = ?3",
                &[&workspace_id.as_str(), &assertion_key, &scenario_id],
            )
            .map_err(PortError::from)?;
        Ok(records
            .into_iter()
            .filter(AssertionRecord::is_open)
            .collect())
    }

    fn lookup_assertions_by_import_run(
        &self,
        import_run_id: &ImportRunId,
    ) -> Result<Vec<AssertionRecord>, PortError> {
        self.query_assertions("import_run_id = ?1", &[&import_run_id.as_str()])
            .map_err(PortError::from)
    }

    fn get_assertions_for_entity(
        &self,
        workspace_id: &WorkspaceId,
        entity_id: &EntityId,
    ) -> Result<Vec<AssertionRecord>, PortError> {
        let connection = self.lock();
        let sql = format!(
            "SELECT {ASSERTION_COLUMNS} FROM assertions \
             JOIN edges ON edges.dst_id = assertions.assertion_id \
             WHERE edges.src_id = ?1 AND edges.edge_type = ?2 \
             ORDER BY assertions.rowid"
        );
        let mut statement = connection
            .prepare(&sql)
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let rows = statement
            .query_map(params![entity_id.as_str(), EDGE_ASSERTED_REL], AssertionRow::read)
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let mut records = Vec::new();
        for row in rows {
            let record = row
                .map_err(SqliteStoreError::from)
                .map_err(PortError::from)?
                .decode()
                .map_err(PortError::from)?;
            if record.workspace_id == *workspace_id {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn insert_property_value(
        &self,
        property_value: &PropertyValue,
    ) -> Result<PropertyValueId, PortError> {
        let connection = self.lock();
        connection
            .execute(
                "INSERT INTO property_values (property_value_id, workspace_id, property_key, \
                 value, value_type) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    property_value.property_value_id.as_str(),
                    property_value.workspace_id.as_str(),
                    property_value.property_key,
                    property_value.value,
                    property_value.value_type.as_str(),
                ],
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        Ok(property_value.property_value_id.clone())
    }

    fn get_property_value(
        &self,
        property_value_id: &PropertyValueId,
    ) -> Result<Option<PropertyValue>, PortError> {
        let connection = self.lock();
        let row = connection
            .query_row(
                "SELECT property_value_id, workspace_id, property_key, value, value_type \
                 FROM property_values WHERE property_value_id = ?1",
                params![property_value_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let Some((id, workspace, property_key, value, value_type)) = row else {
            return Ok(None);
        };
        let value_type = ValueType::parse(&value_type).ok_or_else(|| {
            PortError::Corrupt(format!("bad value_type '{value_type}'"))
        })?;
        Ok(Some(PropertyValue {
            property_value_id: PropertyValueId::new(id),
            workspace_id: parse_workspace(&workspace).map_err(PortError::from)?,
            property_key,
            value,
            value_type,
        }))
    }

    fn insert_change_event(&self, change_event: &ChangeEvent) -> Result<ChangeEventId, PortError> {
        let ts = format_timestamp(change_event.ts).map_err(PortError::from)?;
        let connection = self.lock();
        connection
            .execute(
                "INSERT INTO change_events (change_event_id, workspace_id, event_type, \
                 description, ts, import_run_id, actor, stats) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    change_event.change_event_id.as_str(),
                    change_event.workspace_id.as_str(),
                    change_event.event_type.as_str(),
                    change_event.description,
                    ts,
                    change_event.import_run_id.as_ref().map(ImportRunId::as_str),
                    change_event.actor,
                    change_event.stats,
                ],
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        Ok(change_event.change_event_id.clone())
    }

    fn create_asserted_rel(
        &self,
        from_vertex: &str,
        assertion_id: &AssertionId,
        to_vertex: &str,
    ) -> Result<(), PortError> {
        let mut connection = self.lock();
        let transaction = connection
            .transaction()
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        transaction
            .execute(
                "INSERT OR REPLACE INTO edges (src_id, dst_id, edge_type, description) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![from_vertex, assertion_id.as_str(), EDGE_ASSERTED_REL, assertion_id.as_str()],
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        transaction
            .execute(
                "INSERT OR REPLACE INTO edges (src_id, dst_id, edge_type, description) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![assertion_id.as_str(), to_vertex, EDGE_ASSERTED_REL, assertion_id.as_str()],
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        transaction
            .commit()
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)
    }

    fn link_created_assertion(
        &self,
        change_event_id: &ChangeEventId,
        assertion_id: &AssertionId,
    ) -> Result<(), PortError> {
        self.insert_edge(
            change_event_id.as_str(),
            assertion_id.as_str(),
            LinkKind::Created.edge_type(),
            "created",
        )
    }

    fn link_closed_assertion(
        &self,
        change_event_id: &ChangeEventId,
        assertion_id: &AssertionId,
    ) -> Result<(), PortError> {
        self.insert_edge(
            change_event_id.as_str(),
            assertion_id.as_str(),
            LinkKind::Closed.edge_type(),
            "closed",
        )
    }

    fn link_triggered_by(
        &self,
        change_event_id: &ChangeEventId,
        import_run_id: &ImportRunId,
    ) -> Result<(), PortError> {
        self.insert_edge(
            change_event_id.as_str(),
            import_run_id.as_str(),
            EDGE_TRIGGERED_BY,
            "import",
        )
    }

    fn get_change_event_by_import_run(
        &self,
        workspace_id: &WorkspaceId,
        import_run_id: &ImportRunId,
    ) -> Result<Option<ChangeEvent>, PortError> {
        let connection = self.lock();
        let row = connection
            .query_row(
                "SELECT change_event_id, workspace_id, event_type, description, ts, \
                 import_run_id, actor, stats FROM change_events \
                 WHERE workspace_id = ?1 AND import_run_id = ?2 ORDER BY rowid DESC LIMIT 1",
                params![workspace_id.as_str(), import_run_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let Some((id, workspace, event_type, description, ts, run_id, actor, stats)) = row else {
            return Ok(None);
        };
        let event_type = EventType::parse(&event_type)
            .ok_or_else(|| PortError::Corrupt(format!("bad event_type '{event_type}'")))?;
        Ok(Some(ChangeEvent {
            change_event_id: ChangeEventId::new(id),
            workspace_id: parse_workspace(&workspace).map_err(PortError::from)?,
            event_type,
            description,
            ts: parse_timestamp(&ts).map_err(PortError::from)?,
            import_run_id: run_id.map(ImportRunId::new),
            actor,
            stats,
        }))
    }

    fn lookup_assertions_by_change_event(
        &self,
        change_event_id: &ChangeEventId,
        kind: LinkKind,
    ) -> Result<Vec<AssertionRecord>, PortError> {
        let connection = self.lock();
        let sql = format!(
            "SELECT {ASSERTION_COLUMNS} FROM assertions \
             JOIN edges ON edges.dst_id = assertions.assertion_id \
             WHERE edges.src_id = ?1 AND edges.edge_type = ?2 \
             ORDER BY assertions.rowid"
        );
        let mut statement = connection
            .prepare(&sql)
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let rows = statement
            .query_map(
                params![change_event_id.as_str(), kind.edge_type()],
                AssertionRow::read,
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(
                row.map_err(SqliteStoreError::from)
                    .map_err(PortError::from)?
                    .decode()
                    .map_err(PortError::from)?,
            );
        }
        Ok(records)
    }

    fn get_asserted_rel_target(
        &self,
        assertion_id: &AssertionId,
    ) -> Result<Option<String>, PortError> {
        let connection = self.lock();
        connection
            .query_row(
                "SELECT dst_id FROM edges WHERE src_id = ?1 AND edge_type = ?2 LIMIT 1",
                params![assertion_id.as_str(), EDGE_ASSERTED_REL],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)
    }

    fn insert_import_run(&self, import_run: &ImportRun) -> Result<(), PortError> {
        let started_at = format_timestamp(import_run.started_at).map_err(PortError::from)?;
        let completed_at = import_run
            .completed_at
            .map(format_timestamp)
            .transpose()
            .map_err(PortError::from)?;
        let connection = self.lock();
        connection
            .execute(
                "INSERT INTO import_runs (import_run_id, workspace_id, source_file, spec_name, \
                 started_at, completed_at, status, stats, error_message) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    import_run.import_run_id.as_str(),
                    import_run.workspace_id.as_str(),
                    import_run.source_file,
                    import_run.spec_name,
                    started_at,
                    completed_at,
                    import_run.status.as_str(),
                    import_run.stats,
                    import_run.error_message,
                ],
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        Ok(())
    }

    fn update_import_run(
        &self,
        import_run_id: &ImportRunId,
        update: &ImportRunUpdate,
    ) -> Result<(), PortError> {
        let mut sets: Vec<String> = Vec::new();
        let mut bindings: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(status) = update.status {
            sets.push(format!("status = ?{}", bindings.len() + 1));
            bindings.push(Box::new(status.as_str().to_string()));
        }
        if let Some(completed_at) = update.completed_at {
            let completed_at = format_timestamp(completed_at).map_err(PortError::from)?;
            sets.push(format!("completed_at = ?{}", bindings.len() + 1));
            bindings.push(Box::new(completed_at));
        }
        if let Some(stats) = &update.stats {
            sets.push(format!("stats = ?{}", bindings.len() + 1));
            bindings.push(Box::new(stats.clone()));
        }
        if let Some(error_message) = &update.error_message {
            sets.push(format!("error_message = ?{}", bindings.len() + 1));
            bindings.push(Box::new(error_message.clone()));
        }
        if sets.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE import_runs SET {} WHERE import_run_id = ?{}",
            sets.join(", "),
            bindings.len() + 1
        );
        bindings.push(Box::new(import_run_id.as_str().to_string()));

        let connection = self.lock();
        let binding_refs: Vec<&dyn rusqlite::ToSql> =
            bindings.iter().map(|binding| binding.as_ref()).collect();
        connection
            .execute(&sql, binding_refs.as_slice())
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        Ok(())
    }

    fn get_import_run(
        &self,
        workspace_id: &WorkspaceId,
        import_run_id: &ImportRunId,
    ) -> Result<Option<ImportRun>, PortError> {
        let connection = self.lock();
        let row = connection
            .query_row(
                "SELECT import_run_id, workspace_id, source_file, spec_name, started_at, \
                 completed_at, status, stats, error_message FROM import_runs \
                 WHERE import_run_id = ?1 AND workspace_id = ?2",
                params![import_run_id.as_str(), workspace_id.as_str()],
                ImportRunRow::read,
            )
            .optional()
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        row.map(ImportRunRow::decode)
            .transpose()
            .map_err(PortError::from)
    }

    fn list_import_runs(
        &self,
        workspace_id: &WorkspaceId,
        limit: usize,
    ) -> Result<Vec<ImportRun>, PortError> {
        let connection = self.lock();
        let mut statement = connection
            .prepare(
                "SELECT import_run_id, workspace_id, source_file, spec_name, started_at, \
                 completed_at, status, stats, error_message FROM import_runs \
                 WHERE workspace_id = ?1",
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let rows = statement
            .query_map(params![workspace_id.as_str()], ImportRunRow::read)
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(
                row.map_err(SqliteStoreError::from)
                    .map_err(PortError::from)?
                    .decode()
                    .map_err(PortError::from)?,
            );
        }
        runs.sort_by(|left, right| right.started_at.cmp(&left.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    fn upsert_source(&self, source: &Source) -> Result<SourceId, PortError> {
        let connection = self.lock();
        connection
            .execute(
                "INSERT OR REPLACE INTO sources (source_id, workspace_id, source_name, \
                 source_type, authority_rank, authority_domains, update_frequency, description) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    source.source_id.as_str(),
                    source.workspace_id.as_str(),
                    source.source_name,
                    source.source_type,
                    source.authority_rank,
                    source.authority_domains,
                    source.update_frequency,
                    source.description,
                ],
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        Ok(source.source_id.clone())
    }

    fn list_sources(&self, workspace_id: &WorkspaceId) -> Result<Vec<Source>, PortError> {
        let connection = self.lock();
        let mut statement = connection
            .prepare(
                "SELECT source_id, workspace_id, source_name, source_type, authority_rank, \
                 authority_domains, update_frequency, description FROM sources \
                 WHERE workspace_id = ?1 ORDER BY rowid",
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let rows = statement
            .query_map(params![workspace_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        let mut sources = Vec::new();
        for row in rows {
            let (id, workspace, name, source_type, rank, domains, frequency, description) =
                row.map_err(SqliteStoreError::from).map_err(PortError::from)?;
            sources.push(Source {
                source_id: SourceId::new(id),
                workspace_id: parse_workspace(&workspace).map_err(PortError::from)?,
                source_name: name,
                source_type,
                authority_rank: rank,
                authority_domains: domains,
                update_frequency: frequency,
                description,
            });
        }
        Ok(sources)
    }
}

// ============================================================================
// SECTION: Private Helpers
// ============================================================================

impl SqliteGraphStore {
    /// Inserts one directed edge.
    fn insert_edge(
        &self,
        src_id: &str,
        dst_id: &str,
        edge_type: &str,
        description: &str,
    ) -> Result<(), PortError> {
        let connection = self.lock();
        connection
            .execute(
                "INSERT OR REPLACE INTO edges (src_id, dst_id, edge_type, description) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![src_id, dst_id, edge_type, description],
            )
            .map_err(SqliteStoreError::from)
            .map_err(PortError::from)?;
        Ok(())
    }
}
