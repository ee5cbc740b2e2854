// crates/historian-store/src/lib.rs
// ============================================================================
// Module: Historian Store
// Description: SQLite-backed storage gateway and schema manager.
// Purpose: Own the pooled store connections behind the gateway capability.
// Dependencies: historian-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Production implementation of
//! [`historian_core::StorageGateway`] on `SQLite` with WAL
//! journaling: one mutex-guarded writer connection plus a round-robin read
//! pool, and idempotent schema provisioning for every registered table
//! kind. The rest of the agent never touches `rusqlite` directly.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod gateway;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use gateway::SqliteGateway;
pub use gateway::SqliteGatewayConfig;
pub use gateway::SqliteGatewayError;
pub use schema::provision_schema;
