// crates/factline-store-sqlite/src/lib.rs
// ============================================================================
// Module: Factline SQLite Store
// Description: Reference GraphPort driver backed by SQLite.
// Purpose: Persist the knowledge graph durably for single-node deployments.
// Dependencies: factline-core, rusqlite, serde, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! This crate implements the Factline [`factline_core::GraphPort`] over
//! a single SQLite database: one table per vertex tag plus one generic
//! edge table. It is the reference driver; production deployments may
//! substitute any backend that honors the port contract.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod store;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use store::SqliteGraphStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
