// crates/historian-core/src/envelope.rs
// ============================================================================
// Module: IPC Envelopes
// Description: Inbound and outbound message shapes for the agent channel.
// Purpose: Correlate requests and responses purely by request id.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The agent reads one JSON envelope per line and writes one JSON envelope
//! per line. Responses carry the originating request id; there is no
//! ordering guarantee across distinct ids. Out-of-band telemetry uses the
//! `procinfo` message type, and the agent solicits retention settings with
//! a `settings` request of its own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Inbound Envelope
// ============================================================================

/// Inbound command types accepted by the dispatcher.
///
/// # Invariants
/// - Wire labels are stable lowercase strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    /// Batch insert of data points or log records.
    Write,
    /// Filtered or raw select.
    Read,
    /// JSON-path partial update of a custom record.
    Update,
    /// Delete custom records by id.
    Remove,
    /// Delete all rows of a table.
    RemoveAll,
    /// Raw statement where only the affected count matters.
    Run,
    /// Retention policy push.
    Settings,
}

/// Inbound request envelope.
///
/// # Invariants
/// - `id` is absent only for unsolicited pushes (for example `settings`
///   deliveries answering the agent's own request).
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    /// Request correlation id.
    #[serde(default)]
    pub id: Option<String>,
    /// Command type.
    #[serde(rename = "type")]
    pub command: CommandType,
    /// Command-specific query object (filter, update spec, or raw SQL).
    #[serde(default)]
    pub query: Option<Value>,
    /// Command-specific payload (rows, policy, or ids).
    #[serde(default)]
    pub payload: Option<Value>,
    /// Target table name; defaults per command when absent.
    #[serde(default)]
    pub table: Option<String>,
}

// ============================================================================
// SECTION: Query Objects
// ============================================================================

/// Structured read filter carried in `read` envelopes.
///
/// # Invariants
/// - Exactly one of `sql`, `ids`, or `dn_prop` drives the query; `sql` wins
///   and is passed to the store verbatim.
/// - `ids` and `dn_prop` are comma-separated lists whose order defines the
///   series positions for the trend pivot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadFilter {
    /// Raw passthrough SQL, used verbatim when present.
    #[serde(default)]
    pub sql: Option<String>,
    /// Comma-separated series ids for id-keyed tables.
    #[serde(default)]
    pub ids: Option<String>,
    /// Comma-separated `dn.prop` pairs for name-keyed tables.
    #[serde(default)]
    pub dn_prop: Option<String>,
    /// Inclusive range start in epoch milliseconds.
    #[serde(default)]
    pub start: Option<i64>,
    /// Inclusive range end in epoch milliseconds.
    #[serde(default)]
    pub end: Option<i64>,
    /// When truthy, adds a not-null predicate on the value column.
    #[serde(default)]
    pub notnull: Option<Value>,
    /// Reshape target; `trend` requests the chart pivot.
    #[serde(default)]
    pub target: Option<String>,
    /// Explicit table name override.
    #[serde(default)]
    pub table: Option<String>,
}

impl ReadFilter {
    /// Returns true when the not-null predicate is requested.
    ///
    /// The channel peer sends JavaScript truthy values here, so booleans,
    /// non-zero numbers, and non-empty strings all count.
    #[must_use]
    pub fn notnull_requested(&self) -> bool {
        match &self.notnull {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_f64().is_some_and(|value| value != 0.0),
            Some(Value::String(text)) => !text.is_empty(),
            _ => false,
        }
    }

    /// Returns true when the caller requested the trend pivot.
    #[must_use]
    pub fn wants_trend(&self) -> bool {
        self.target.as_deref() == Some("trend")
    }
}

/// Update spec carried in `update` envelopes.
///
/// # Invariants
/// - `field` is a dotted, optionally indexed path such as `head.Weight` or
///   `rows.OpType[3]`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateQuery {
    /// Target table name; defaults to the custom table.
    #[serde(default)]
    pub table: Option<String>,
    /// Row id to patch.
    pub id: i64,
    /// Dotted/indexed JSON field path.
    pub field: String,
    /// New value for the field.
    pub value: Value,
    /// When set, the value is coerced to a number instead of a JSON string.
    #[serde(default)]
    pub numeric: bool,
}

// ============================================================================
// SECTION: Outbound Envelope
// ============================================================================

/// Out-of-band message type labels.
///
/// # Invariants
/// - Wire labels are stable lowercase strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Process telemetry message.
    Procinfo,
    /// Settings solicitation message.
    Settings,
}

/// Process telemetry payload sent out-of-band.
///
/// # Invariants
/// - Absent fields are omitted from the wire form; a message carries only
///   the values that changed or were sampled in this sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcInfo {
    /// Aggregate store size in megabytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    /// Current overflow flag (0 or 1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow: Option<u8>,
    /// Running maximum write latency in milliseconds.
    #[serde(rename = "lastMaxTimeWrite", skip_serializing_if = "Option::is_none")]
    pub last_max_time_write: Option<u64>,
    /// Batch size observed at the write latency high-water mark.
    #[serde(rename = "lastMaxCountWrite", skip_serializing_if = "Option::is_none")]
    pub last_max_count_write: Option<u64>,
    /// Running maximum read latency in milliseconds.
    #[serde(rename = "lastMaxTimeRead", skip_serializing_if = "Option::is_none")]
    pub last_max_time_read: Option<u64>,
    /// Row count observed at the read latency high-water mark.
    #[serde(rename = "lastMaxCountRead", skip_serializing_if = "Option::is_none")]
    pub last_max_count_read: Option<u64>,
    /// Per-table row counts keyed by table name.
    #[serde(flatten)]
    pub tables: BTreeMap<String, u64>,
}

/// Outbound envelope written to the channel.
///
/// # Invariants
/// - `Result` and `Error` are mutually exclusive per request id.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// Successful response correlated by request id.
    Result {
        /// Originating request id.
        id: String,
        /// Echo of the query object when the peer needs it for routing.
        #[serde(skip_serializing_if = "Option::is_none")]
        query: Option<Value>,
        /// Result payload.
        payload: Value,
    },
    /// Failure response correlated by request id.
    Error {
        /// Originating request id.
        id: String,
        /// Short error message.
        error: String,
    },
    /// Out-of-band process telemetry.
    ProcInfo {
        /// Message type label (`procinfo`).
        #[serde(rename = "type")]
        kind: MessageKind,
        /// Telemetry payload.
        data: ProcInfo,
    },
    /// Solicitation for a retention settings push.
    SettingsRequest {
        /// Fixed `settings` correlation id.
        id: String,
        /// Message type label (`settings`).
        #[serde(rename = "type")]
        kind: MessageKind,
    },
}

impl OutboundMessage {
    /// Builds a success response.
    #[must_use]
    pub const fn result(id: String, query: Option<Value>, payload: Value) -> Self {
        Self::Result { id, query, payload }
    }

    /// Builds an error response.
    #[must_use]
    pub const fn error(id: String, error: String) -> Self {
        Self::Error { id, error }
    }

    /// Builds an out-of-band telemetry message.
    #[must_use]
    pub const fn procinfo(data: ProcInfo) -> Self {
        Self::ProcInfo {
            kind: MessageKind::Procinfo,
            data,
        }
    }

    /// Builds the hourly settings solicitation.
    #[must_use]
    pub fn settings_request() -> Self {
        Self::SettingsRequest {
            id: "settings".to_string(),
            kind: MessageKind::Settings,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn inbound_write_envelope_parses() {
        let raw = json!({
            "id": "q-1",
            "type": "write",
            "payload": [{"id": 5, "ts": 1000, "val": 3.2}],
            "table": "records"
        });
        let envelope: RequestEnvelope =
            serde_json::from_value(raw).unwrap_or_else(|err| panic!("parse: {err}"));
        assert_eq!(envelope.command, CommandType::Write);
        assert_eq!(envelope.id.as_deref(), Some("q-1"));
        assert_eq!(envelope.table.as_deref(), Some("records"));
    }

    #[test]
    fn removeall_label_round_trips() {
        let parsed: CommandType =
            serde_json::from_value(json!("removeall")).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(parsed, CommandType::RemoveAll);
    }

    #[test]
    fn notnull_accepts_truthy_values() {
        let truthy = ReadFilter {
            notnull: Some(json!(1)),
            ..ReadFilter::default()
        };
        let falsy = ReadFilter {
            notnull: Some(json!(0)),
            ..ReadFilter::default()
        };
        assert!(truthy.notnull_requested());
        assert!(!falsy.notnull_requested());
        assert!(!ReadFilter::default().notnull_requested());
    }

    #[test]
    fn procinfo_omits_absent_fields() {
        let message = OutboundMessage::procinfo(ProcInfo {
            overflow: Some(1),
            ..ProcInfo::default()
        });
        let wire = serde_json::to_value(&message).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(wire, json!({"type": "procinfo", "data": {"overflow": 1}}));
    }

    #[test]
    fn settings_request_matches_wire_contract() {
        let wire = serde_json::to_value(OutboundMessage::settings_request())
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(wire, json!({"id": "settings", "type": "settings"}));
    }
}
