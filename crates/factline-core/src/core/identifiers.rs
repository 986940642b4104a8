// crates/factline-core/src/core/identifiers.rs
// ============================================================================
// Module: Factline Identifiers
// Description: Workspace and vertex identifiers with stable prefixes.
// Purpose: Provide strongly typed, time-sortable, serializable identifiers.
// Dependencies: rand, serde, thiserror, crate::core::time
// ============================================================================

//! ## Overview
//! Every vertex carries a system identifier rendered as a short prefix
//! (`ent_`, `asrt_`, `pv_`, `ce_`, `ir_`, `src_`) followed by 32 lowercase
//! hex characters encoding a time-sortable 128-bit payload. The rendered
//! form always fits the fixed 64-byte identifier column of the backing
//! store. Workspace identifiers are caller-supplied and validated against
//! `^[a-z0-9_]{1,64}$`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::time::SharedClock;

// ============================================================================
// SECTION: Workspace Identifier
// ============================================================================

/// Errors produced when validating a workspace identifier.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkspaceIdError {
    /// The identifier is empty or longer than 64 bytes.
    #[error("workspace id length out of range: {0}")]
    Length(usize),
    /// The identifier contains a character outside `[a-z0-9_]`.
    #[error("workspace id contains invalid character: '{0}'")]
    Character(char),
}

/// Workspace identifier scoping every record in the graph.
///
/// # Invariants
/// - Matches `^[a-z0-9_]{1,64}$`; construction enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Creates a workspace identifier, validating the character set and length.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceIdError`] when the value is empty, longer than
    /// 64 bytes, or contains a character outside `[a-z0-9_]`.
    pub fn new(id: impl Into<String>) -> Result<Self, WorkspaceIdError> {
        let id = id.into();
        if id.is_empty() || id.len() > 64 {
            return Err(WorkspaceIdError::Length(id.len()));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_'))
        {
            return Err(WorkspaceIdError::Character(bad));
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Vertex Identifier Types
// ============================================================================

/// Entity vertex identifier (`ent_` prefix).
///
/// # Invariants
/// - Opaque UTF-8 string; generated values are prefix + 32 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity identifier from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Assertion vertex identifier (`asrt_` prefix).
///
/// # Invariants
/// - Opaque UTF-8 string; generated values are prefix + 32 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssertionId(String);

impl AssertionId {
    /// Creates an assertion identifier from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssertionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for AssertionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AssertionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Property value vertex identifier (`pv_` prefix).
///
/// # Invariants
/// - Opaque UTF-8 string; generated values are prefix + 32 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyValueId(String);

impl PropertyValueId {
    /// Creates a property value identifier from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PropertyValueId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PropertyValueId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Change event vertex identifier (`ce_` prefix).
///
/// # Invariants
/// - Opaque UTF-8 string; generated values are prefix + 32 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeEventId(String);

impl ChangeEventId {
    /// Creates a change event identifier from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ChangeEventId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChangeEventId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Import run vertex identifier (`ir_` prefix).
///
/// # Invariants
/// - Opaque UTF-8 string; generated values are prefix + 32 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImportRunId(String);

impl ImportRunId {
    /// Creates an import run identifier from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImportRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ImportRunId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ImportRunId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Source vertex identifier (`src_` prefix).
///
/// # Invariants
/// - Opaque UTF-8 string; generated values are prefix + 32 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Creates a source identifier from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Identifier Generation
// ============================================================================

/// Internal monotonic state of an [`IdGenerator`].
#[derive(Debug, Clone, Copy)]
struct GeneratorState {
    /// Millisecond component of the most recently issued payload.
    last_millis: u64,
    /// Sequence counter within the current millisecond.
    sequence: u16,
}

/// Generator for time-sortable 128-bit identifier payloads.
///
/// # Invariants
/// - Payloads are strictly increasing per generator: 48 bits of unix
///   milliseconds, a 16-bit per-millisecond sequence, then 64 random bits.
/// - Rendered identifiers are `prefix + 32 lowercase hex chars` and never
///   exceed 64 bytes.
pub struct IdGenerator {
    /// Clock supplying the millisecond component.
    clock: SharedClock,
    /// Monotonicity guard across concurrent callers.
    state: Mutex<GeneratorState>,
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

impl IdGenerator {
    /// Creates a generator backed by the given clock.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            state: Mutex::new(GeneratorState {
                last_millis: 0,
                sequence: 0,
            }),
        }
    }

    /// Produces the next time-sortable 128-bit payload.
    fn next_payload(&self) -> u128 {
        let nanos = self.clock.now().unix_timestamp_nanos();
        let millis = u64::try_from(nanos / 1_000_000).unwrap_or(0) & 0xFFFF_FFFF_FFFF;
        let (millis, sequence) = match self.state.lock() {
            Ok(mut state) => {
                if millis > state.last_millis {
                    state.last_millis = millis;
                    state.sequence = 0;
                } else {
                    state.sequence = state.sequence.wrapping_add(1);
                }
                (state.last_millis, state.sequence)
            }
            // A poisoned guard only ever holds plain counters; fall back to
            // the raw clock reading rather than failing identifier creation.
            Err(poisoned) => (millis.max(poisoned.get_ref().last_millis), 0),
        };
        (u128::from(millis) << 80) | (u128::from(sequence) << 64) | u128::from(rand::random::<u64>())
    }

    /// Renders the next payload under the given prefix.
    fn render(&self, prefix: &str) -> String {
        format!("{prefix}{:032x}", self.next_payload())
    }

    /// Generates a new entity identifier.
    #[must_use]
    pub fn entity_id(&self) -> EntityId {
        EntityId::new(self.render("ent_"))
    }

    /// Generates a new assertion identifier.
    #[must_use]
    pub fn assertion_id(&self) -> AssertionId {
        AssertionId::new(self.render("asrt_"))
    }

    /// Generates a new property value identifier.
    #[must_use]
    pub fn property_value_id(&self) -> PropertyValueId {
        PropertyValueId::new(self.render("pv_"))
    }

    /// Generates a new change event identifier.
    #[must_use]
    pub fn change_event_id(&self) -> ChangeEventId {
        ChangeEventId::new(self.render("ce_"))
    }

    /// Generates a new import run identifier.
    #[must_use]
    pub fn import_run_id(&self) -> ImportRunId {
        ImportRunId::new(self.render("ir_"))
    }

    /// Generates a new source identifier.
    #[must_use]
    pub fn source_id(&self) -> SourceId {
        SourceId::new(self.render("src_"))
    }
}
