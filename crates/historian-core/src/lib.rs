// crates/historian-core/src/lib.rs
// ============================================================================
// Module: Historian Core
// Description: Pure types and translation logic for the historian agent.
// Purpose: Table registry, envelopes, query building, reshaping, policy.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! `historian-core` holds everything the agent needs that performs no I/O:
//! the static table registry, IPC envelope shapes, the query builder that
//! translates structured requests into parameterized SQL, the trend pivot
//! used to reshape rows for charting, retention policy types, and the
//! shared telemetry state read by the write path and written by the
//! overflow controller. The storage engine itself is abstracted behind
//! [`StorageGateway`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod envelope;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod query;
pub mod state;
pub mod tables;
pub mod trend;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use envelope::CommandType;
pub use envelope::OutboundMessage;
pub use envelope::ProcInfo;
pub use envelope::ReadFilter;
pub use envelope::RequestEnvelope;
pub use envelope::UpdateQuery;
pub use error::AgentError;
pub use gateway::GatewayError;
pub use gateway::Row;
pub use gateway::StorageGateway;
pub use policy::AGE_BUCKETS_DAYS;
pub use policy::DELETE_CHUNK_MAX;
pub use policy::LogRetentionEntry;
pub use policy::MS_PER_DAY;
pub use policy::PolicyScope;
pub use policy::RetentionEntry;
pub use policy::RetentionKey;
pub use policy::SettingsPayload;
pub use policy::cutoff_ms;
pub use query::SqlValue;
pub use query::Statement;
pub use query::build_delete_all;
pub use query::build_delete_by_ids;
pub use query::build_delete_by_level;
pub use query::build_delete_chunk;
pub use query::build_delete_older_than;
pub use query::build_insert;
pub use query::build_json_patch;
pub use query::build_select;
pub use state::SharedState;
pub use tables::ColumnSpec;
pub use tables::Coercion;
pub use tables::TableKind;
pub use tables::TableSchema;
pub use trend::pivot_trend;
pub use trend::single_series;
