// crates/historian-core/src/gateway.rs
// ============================================================================
// Module: Storage Gateway Interface
// Description: Capability trait for the underlying time-series store.
// Purpose: Keep the agent independent of the concrete storage engine.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! The storage engine is treated as a capability: execute parameterized SQL
//! text, return rows or an error. The agent holds an `Arc<dyn
//! StorageGateway>`; the production implementation lives in
//! `historian-store`, test doubles live next to the tests that need them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::query::Statement;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A result row keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Errors surfaced by a storage gateway.
///
/// # Invariants
/// - Messages avoid embedding bound parameter values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Pool or store unreachable.
    #[error("store connection error: {0}")]
    Connection(String),
    /// Store rejected the statement.
    #[error("store query error: {0}")]
    Query(String),
    /// Result rows could not be decoded into JSON values.
    #[error("store decode error: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Gateway Trait
// ============================================================================

/// Capability interface over the time-series relational store.
///
/// # Invariants
/// - `execute` returns rows in statement order; it never mutates.
/// - `run` is used for statements where only the affected count matters.
/// - Neither call retries; retry policy belongs to the IPC peer.
pub trait StorageGateway: Send + Sync {
    /// Executes a statement and returns its result rows.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the store rejects the statement or the
    /// connection is unusable.
    fn execute(&self, stmt: &Statement) -> Result<Vec<Row>, GatewayError>;

    /// Runs a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the store rejects the statement or the
    /// connection is unusable.
    fn run(&self, stmt: &Statement) -> Result<u64, GatewayError>;

    /// Returns the aggregate on-disk size of the store in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the size probe fails.
    fn database_size_bytes(&self) -> Result<u64, GatewayError>;

    /// Returns the current row count of the named table.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the count query fails.
    fn row_count(&self, table: &str) -> Result<u64, GatewayError>;
}
