// crates/factline-cli/src/main.rs
// ============================================================================
// Module: Factline CLI Entry Point
// Description: Command dispatcher for imports, run inspection, and views.
// Purpose: Drive the ingestion engine and query surface from the shell.
// Dependencies: clap, factline-config, factline-core, factline-ingest,
//               factline-store-sqlite, serde_json, thiserror, time,
//               tracing-subscriber
// ============================================================================

//! ## Overview
//! The `factline` binary wires the ingestion engine to the SQLite
//! reference store. It runs imports synchronously, lists and inspects
//! import runs, shows the diff recorded by a run's change event, and
//! projects entities through the resolved view engine. All output is
//! JSON on stdout; logs go to stderr under `RUST_LOG` control.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use factline_config::Settings;
use factline_config::SettingsError;
use factline_config::SpecError;
use factline_config::load_spec;
use factline_core::EntityId;
use factline_core::GraphPort;
use factline_core::ImportRunId;
use factline_core::LinkKind;
use factline_core::PortError;
use factline_core::SourceId;
use factline_core::SystemClock;
use factline_core::WorkspaceId;
use factline_core::WorkspaceIdError;
use factline_ingest::CancelToken;
use factline_ingest::IngestionEngine;
use factline_ingest::ViewMode;
use factline_ingest::WorkbookInput;
use factline_ingest::entity_view;
use factline_store_sqlite::SqliteGraphStore;
use factline_store_sqlite::SqliteStoreConfig;
use factline_store_sqlite::SqliteStoreError;
use factline_store_sqlite::SqliteSyncMode;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI errors surfaced to the operator.
#[derive(Debug, Error)]
enum CliError {
    /// Workspace identifier failed validation.
    #[error("invalid workspace id: {0}")]
    Workspace(#[from] WorkspaceIdError),
    /// Ingestion spec failed to load.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// Settings failed to load.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// Store failed to open.
    #[error(transparent)]
    Store(#[from] SqliteStoreError),
    /// Graph port call failed.
    #[error(transparent)]
    Port(#[from] PortError),
    /// Workbook or output I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// A requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A command argument failed to parse.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

// ============================================================================
// SECTION: Command Line
// ============================================================================

/// Bitemporal knowledge-graph ingestion and resolution engine.
#[derive(Debug, Parser)]
#[command(name = "factline", version, about)]
struct Cli {
    /// Path to the SQLite database file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Command to execute.
    #[command(subcommand)]
    command: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Run an import of a workbook JSON file under an ingestion spec.
    Import {
        /// Workspace to import into.
        #[arg(long)]
        workspace: String,
        /// Name of the ingestion spec (file stem under the specs dir).
        #[arg(long)]
        spec: String,
        /// Path to the workbook JSON file.
        #[arg(long)]
        file: PathBuf,
        /// Registered source id attributed to produced assertions.
        #[arg(long)]
        source: Option<String>,
        /// Directory holding ingestion specs; defaults to settings.
        #[arg(long)]
        specs_dir: Option<PathBuf>,
    },
    /// List import runs for a workspace.
    Runs {
        /// Workspace to list.
        #[arg(long)]
        workspace: String,
        /// Maximum runs to show.
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show one import run with parsed stats.
    Run {
        /// Workspace owning the run.
        #[arg(long)]
        workspace: String,
        /// Import run identifier.
        #[arg(long)]
        id: String,
    },
    /// Show the change-event diff recorded by an import run.
    Diff {
        /// Workspace owning the run.
        #[arg(long)]
        workspace: String,
        /// Import run identifier.
        #[arg(long)]
        id: String,
    },
    /// Project an entity through the resolved view engine.
    Entity {
        /// Workspace owning the entity.
        #[arg(long)]
        workspace: String,
        /// Entity identifier.
        #[arg(long)]
        id: String,
        /// Projection mode.
        #[arg(long, value_enum, default_value = "resolved")]
        view_mode: ViewModeArg,
        /// Scenario overlay to prefer.
        #[arg(long, default_value = "base")]
        scenario: String,
        /// Optional RFC 3339 point-in-time filter.
        #[arg(long)]
        at: Option<String>,
    },
    /// Register or update a source for authority ranking.
    SourceAdd {
        /// Workspace owning the source.
        #[arg(long)]
        workspace: String,
        /// Human-readable source name.
        #[arg(long)]
        name: String,
        /// Source type label.
        #[arg(long, default_value = "excel")]
        source_type: String,
        /// Authority rank; lower is more authoritative.
        #[arg(long)]
        rank: i64,
    },
    /// List registered sources for a workspace.
    Sources {
        /// Workspace to list.
        #[arg(long)]
        workspace: String,
    },
}

/// Projection mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
enum ViewModeArg {
    /// One winning claim per assertion key.
    Resolved,
    /// Every claim, annotated with the winner flag.
    AllClaims,
}

impl From<ViewModeArg> for ViewMode {
    fn from(value: ViewModeArg) -> Self {
        match value {
            ViewModeArg::Resolved => Self::Resolved,
            ViewModeArg::AllClaims => Self::AllClaims,
        }
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Entry point: initializes logging, parses the command line, and
/// dispatches.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Writes a JSON value to stdout.
fn emit(value: &serde_json::Value) -> Result<(), CliError> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Opens the store at the resolved database path.
fn open_store(db: Option<PathBuf>, settings: &Settings) -> Result<SqliteGraphStore, CliError> {
    let path = db.unwrap_or_else(|| settings.data_dir.join("factline.db"));
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(SqliteGraphStore::open(&SqliteStoreConfig {
        path,
        busy_timeout_ms: 5_000,
        sync_mode: SqliteSyncMode::Full,
    })?)
}

/// Parses run stats JSON into a value, passing raw text through on
/// failure.
fn parse_stats(stats: Option<&str>) -> serde_json::Value {
    match stats {
        Some(text) => serde_json::from_str(text)
            .unwrap_or_else(|_| serde_json::Value::String(text.to_string())),
        None => serde_json::Value::Null,
    }
}

/// Dispatches the parsed command line.
fn run(cli: Cli) -> Result<(), CliError> {
    let settings = Settings::from_env()?;
    let store = Arc::new(open_store(cli.db, &settings)?);

    match cli.command {
        Command::Import {
            workspace,
            spec,
            file,
            source,
            specs_dir,
        } => {
            let workspace_id = WorkspaceId::new(workspace)?;
            let specs_dir = specs_dir.unwrap_or_else(|| settings.specs_dir.clone());
            let spec = load_spec(&specs_dir, &spec)?;
            let json = fs::read_to_string(&file)?;
            let source_id = source.map(SourceId::new);
            let source_file = file
                .file_name()
                .and_then(|name| name.to_str())
                .map(ToString::to_string);

            // Retain the uploaded file under data/raw/{workspace}/ before parsing.
            if let Some(name) = &source_file {
                let raw_dir = settings.raw_upload_dir(workspace_id.as_str());
                fs::create_dir_all(&raw_dir)?;
                fs::write(raw_dir.join(name), &json)?;
            }

            let engine = IngestionEngine::new(store, Arc::new(SystemClock));
            let result = engine.run_import(
                &workspace_id,
                WorkbookInput::Json(&json),
                &spec,
                source_id.as_ref(),
                source_file.as_deref(),
                &CancelToken::new(),
            );
            emit(&serde_json::to_value(&result)?)
        }
        Command::Runs { workspace, limit } => {
            let workspace_id = WorkspaceId::new(workspace)?;
            let runs = store.list_import_runs(&workspace_id, limit)?;
            let rows: Vec<serde_json::Value> = runs
                .iter()
                .map(|run| {
                    let mut value = serde_json::to_value(run)?;
                    if let Some(object) = value.as_object_mut() {
                        object.insert("stats".to_string(), parse_stats(run.stats.as_deref()));
                    }
                    Ok(value)
                })
                .collect::<Result<_, serde_json::Error>>()?;
            emit(&serde_json::Value::Array(rows))
        }
        Command::Run { workspace, id } => {
            let workspace_id = WorkspaceId::new(workspace)?;
            let run_id = ImportRunId::new(id);
            let run = store
                .get_import_run(&workspace_id, &run_id)?
                .ok_or_else(|| CliError::NotFound(format!("import run {run_id}")))?;
            let mut value = serde_json::to_value(&run)?;
            if let Some(object) = value.as_object_mut() {
                object.insert("stats".to_string(), parse_stats(run.stats.as_deref()));
            }
            emit(&value)
        }
        Command::Diff { workspace, id } => {
            let workspace_id = WorkspaceId::new(workspace)?;
            let run_id = ImportRunId::new(id);
            if store.get_import_run(&workspace_id, &run_id)?.is_none() {
                return Err(CliError::NotFound(format!("import run {run_id}")));
            }
            let change_event = store.get_change_event_by_import_run(&workspace_id, &run_id)?;
            let (change_event_id, stats, created, closed) = match &change_event {
                Some(event) => (
                    Some(event.change_event_id.as_str().to_string()),
                    parse_stats(event.stats.as_deref()),
                    store.lookup_assertions_by_change_event(
                        &event.change_event_id,
                        LinkKind::Created,
                    )?,
                    store.lookup_assertions_by_change_event(
                        &event.change_event_id,
                        LinkKind::Closed,
                    )?,
                ),
                None => (None, serde_json::Value::Null, Vec::new(), Vec::new()),
            };
            emit(&serde_json::json!({
                "import_run_id": run_id.as_str(),
                "change_event_id": change_event_id,
                "stats": stats,
                "created_assertions": created,
                "closed_assertions": closed,
            }))
        }
        Command::Entity {
            workspace,
            id,
            view_mode,
            scenario,
            at,
        } => {
            let workspace_id = WorkspaceId::new(workspace)?;
            let entity_id = EntityId::new(id);
            let at_time = at
                .map(|text| {
                    OffsetDateTime::parse(&text, &Rfc3339)
                        .map_err(|err| CliError::InvalidArgument(format!("--at: {err}")))
                })
                .transpose()?;
            let view = entity_view(
                store.as_ref(),
                &workspace_id,
                &entity_id,
                view_mode.into(),
                &scenario,
                at_time,
            )?
            .ok_or_else(|| CliError::NotFound(format!("entity {entity_id}")))?;
            emit(&serde_json::to_value(&view)?)
        }
        Command::SourceAdd {
            workspace,
            name,
            source_type,
            rank,
        } => {
            let workspace_id = WorkspaceId::new(workspace)?;
            let clock: factline_core::SharedClock = Arc::new(SystemClock);
            let ids = factline_core::IdGenerator::new(clock);
            let source = factline_core::Source {
                source_id: ids.source_id(),
                workspace_id,
                source_name: name,
                source_type,
                authority_rank: rank,
                authority_domains: None,
                update_frequency: None,
                description: None,
            };
            let source_id = store.upsert_source(&source)?;
            emit(&serde_json::json!({ "source_id": source_id.as_str() }))
        }
        Command::Sources { workspace } => {
            let workspace_id = WorkspaceId::new(workspace)?;
            let sources = store.list_sources(&workspace_id)?;
            emit(&serde_json::to_value(&sources)?)
        }
    }
}
