// crates/factline-config/src/settings.rs
// ============================================================================
// Module: Factline Settings
// Description: Environment-derived backend endpoints and directories.
// Purpose: Configure store hosts, credentials, and on-disk layout.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Deployment configuration comes from `FACTLINE_*` environment
//! variables with development defaults. The settings cover the graph
//! store endpoint and credentials, the vector and cache endpoints, the
//! keyspace name, and the directories holding schemas, specs, and
//! uploaded data. Unknown variables are ignored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Settings loading errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A numeric environment variable failed to parse.
    #[error("invalid value for {name}: {value}")]
    InvalidNumber {
        /// Environment variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Deployment settings for one Factline process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Graph store host.
    pub graph_host: String,
    /// Graph store port.
    pub graph_port: u16,
    /// Graph store user.
    pub graph_user: String,
    /// Graph store password.
    pub graph_password: String,
    /// Graph keyspace / space name.
    pub graph_space: String,
    /// Vector store host.
    pub vector_host: String,
    /// Vector store port.
    pub vector_port: u16,
    /// Cache host.
    pub cache_host: String,
    /// Cache port.
    pub cache_port: u16,
    /// Directory holding domain schema YAML files.
    pub schemas_dir: PathBuf,
    /// Directory holding ingestion spec YAML files.
    pub specs_dir: PathBuf,
    /// Directory receiving uploaded source files
    /// (`data/raw/{workspace_id}/{filename}`).
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            graph_host: "127.0.0.1".to_string(),
            graph_port: 9669,
            graph_user: "root".to_string(),
            graph_password: String::new(),
            graph_space: "factline".to_string(),
            vector_host: "127.0.0.1".to_string(),
            vector_port: 9333,
            cache_host: "127.0.0.1".to_string(),
            cache_port: 9379,
            schemas_dir: PathBuf::from("schemas"),
            specs_dir: PathBuf::from("specs"),
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Reads a string environment variable with a default.
fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Reads a port environment variable with a default.
fn env_port(name: &'static str, default: u16) -> Result<u16, SettingsError> {
    match env::var(name) {
        Ok(value) => value.parse::<u16>().map_err(|_| SettingsError::InvalidNumber {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}

impl Settings {
    /// Loads settings from `FACTLINE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when a port variable is present but not
    /// a valid number.
    pub fn from_env() -> Result<Self, SettingsError> {
        let defaults = Self::default();
        Ok(Self {
            graph_host: env_string("FACTLINE_GRAPH_HOST", &defaults.graph_host),
            graph_port: env_port("FACTLINE_GRAPH_PORT", defaults.graph_port)?,
            graph_user: env_string("FACTLINE_GRAPH_USER", &defaults.graph_user),
            graph_password: env_string("FACTLINE_GRAPH_PASSWORD", &defaults.graph_password),
            graph_space: env_string("FACTLINE_GRAPH_SPACE", &defaults.graph_space),
            vector_host: env_string("FACTLINE_VECTOR_HOST", &defaults.vector_host),
            vector_port: env_port("FACTLINE_VECTOR_PORT", defaults.vector_port)?,
            cache_host: env_string("FACTLINE_CACHE_HOST", &defaults.cache_host),
            cache_port: env_port("FACTLINE_CACHE_PORT", defaults.cache_port)?,
            schemas_dir: PathBuf::from(env_string("FACTLINE_SCHEMAS_DIR", "schemas")),
            specs_dir: PathBuf::from(env_string("FACTLINE_SPECS_DIR", "specs")),
            data_dir: PathBuf::from(env_string("FACTLINE_DATA_DIR", "data")),
        })
    }

    /// Returns the raw-upload directory for a workspace.
    #[must_use]
    pub fn raw_upload_dir(&self, workspace_id: &str) -> PathBuf {
        self.data_dir.join("raw").join(workspace_id)
    }
}
