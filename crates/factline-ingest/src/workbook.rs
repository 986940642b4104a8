// crates/factline-ingest/src/workbook.rs
// ============================================================================
// Module: Factline Workbook Model
// Description: In-memory tabular source with named sheets of cell rows.
// Purpose: Decouple the parser and engine from any file format decoder.
// Dependencies: factline-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A [`Workbook`] is the decoded form of a tabular source: ordered named
//! sheets, each an ordered list of cell rows. Rows may be ragged; the
//! parser pads against the header width. The JSON codec is the on-disk
//! interchange form accepted by the CLI; binary spreadsheet decoding
//! happens outside this crate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;

use factline_core::Cell;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Workbook decoding errors.
///
/// # Invariants
/// - A decode failure aborts the import run that requested it.
#[derive(Debug, Error)]
pub enum WorkbookError {
    /// The workbook payload could not be read.
    #[error("workbook unreadable: {0}")]
    Unreadable(String),
}

// ============================================================================
// SECTION: Model
// ============================================================================

/// One sheet of a workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    /// Sheet name; referenced by `sheet_name` in sheet specs.
    pub name: String,
    /// Rows of cells, header row included.
    #[serde(default)]
    pub rows: Vec<Vec<Cell>>,
}

/// A decoded tabular source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    /// Sheets in workbook order.
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Finds a sheet by exact name.
    #[must_use]
    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    /// Decodes a workbook from its JSON interchange form.
    ///
    /// # Errors
    ///
    /// Returns [`WorkbookError::Unreadable`] when the payload is not a
    /// valid workbook document.
    pub fn from_json_str(json: &str) -> Result<Self, WorkbookError> {
        serde_json::from_str(json).map_err(|err| WorkbookError::Unreadable(err.to_string()))
    }

    /// Decodes a workbook from a JSON reader.
    ///
    /// # Errors
    ///
    /// Returns [`WorkbookError::Unreadable`] when reading or decoding
    /// fails.
    pub fn from_json_reader(reader: impl Read) -> Result<Self, WorkbookError> {
        serde_json::from_reader(reader).map_err(|err| WorkbookError::Unreadable(err.to_string()))
    }
}
