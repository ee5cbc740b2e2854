// crates/historian-agent/src/read.rs
// ============================================================================
// Module: Read Path
// Description: Filtered selects with chart reshaping.
// Purpose: Validate filters, execute reads, reshape rows for the caller.
// Dependencies: historian-core, tracing
// ============================================================================

//! ## Overview
//! A raw-SQL filter is executed verbatim; a structured filter is validated
//! before the gateway is touched. Trend reads reshape rows into chart
//! tuples; other id-keyed reads resolve stored ids back to the caller's
//! `dn.prop` names when the filter carries both lists. Read latency is a
//! running maximum reported out-of-band on change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use historian_core::AgentError;
use historian_core::ReadFilter;
use historian_core::Row;
use historian_core::SharedState;
use historian_core::StorageGateway;
use historian_core::build_select;
use historian_core::envelope::OutboundMessage;
use historian_core::envelope::ProcInfo;
use historian_core::pivot_trend;
use historian_core::single_series;
use serde_json::Value;
use tracing::debug;

use crate::channel::Channel;

// ============================================================================
// SECTION: Read Path
// ============================================================================

/// Filtered select handler.
#[derive(Clone)]
pub struct ReadPath {
    /// Store capability.
    gateway: Arc<dyn StorageGateway>,
    /// Latency marks.
    state: Arc<SharedState>,
    /// Outbound envelope queue.
    channel: Channel,
}

impl ReadPath {
    /// Builds the read path over shared agent state.
    #[must_use]
    pub fn new(gateway: Arc<dyn StorageGateway>, state: Arc<SharedState>, channel: Channel) -> Self {
        Self {
            gateway,
            state,
            channel,
        }
    }

    /// Handles one read envelope: validate, execute, reshape, respond.
    pub fn read(&self, id: &str, raw_query: &Value) {
        let filter: ReadFilter = match serde_json::from_value(raw_query.clone()) {
            Ok(filter) => filter,
            Err(err) => {
                self.channel.send_error(id, &AgentError::Validation(err.to_string()));
                return;
            }
        };
        let stmt = match build_select(&filter) {
            Ok(stmt) => stmt,
            Err(err) => {
                self.channel.send_error(id, &err);
                return;
            }
        };

        let started = Instant::now();
        let rows = match self.gateway.execute(&stmt) {
            Ok(rows) => rows,
            Err(err) => {
                self.channel.send_error(id, &AgentError::from(err));
                return;
            }
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(id, rows = rows.len(), elapsed_ms, "read completed");
        let row_count = u64::try_from(rows.len()).unwrap_or(u64::MAX);
        if let Some((mark_ms, mark_count)) = self.state.record_read(elapsed_ms, row_count) {
            self.channel.send(OutboundMessage::procinfo(ProcInfo {
                last_max_time_read: Some(mark_ms),
                last_max_count_read: Some(mark_count),
                ..ProcInfo::default()
            }));
        }

        let payload = reshape(&filter, rows);
        self.channel
            .send(OutboundMessage::result(id.to_string(), Some(raw_query.clone()), payload));
    }
}

// ============================================================================
// SECTION: Reshaping
// ============================================================================

/// Applies the filter's reshaping policy to result rows.
fn reshape(filter: &ReadFilter, rows: Vec<Row>) -> Value {
    if filter.sql.is_some() {
        return rows_to_value(rows);
    }
    if let Some(ids) = &filter.ids {
        let id_list = parse_ids(ids);
        if filter.wants_trend() {
            return if id_list.len() == 1 {
                Value::Array(single_series(&rows).into_iter().map(Value::Array).collect())
            } else {
                Value::Array(pivot_trend(&rows, &id_list).into_iter().map(Value::Array).collect())
            };
        }
        if let Some(dn_prop) = &filter.dn_prop {
            return resolve_names(&rows, &id_list, dn_prop);
        }
    }
    rows_to_value(rows)
}

/// Converts rows into a JSON array payload.
fn rows_to_value(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}

/// Parses the comma-separated id list, skipping blanks.
fn parse_ids(raw: &str) -> Vec<i64> {
    raw.split(',').filter_map(|part| part.trim().parse::<i64>().ok()).collect()
}

/// Resolves stored ids back to the caller's `dn.prop` names by list
/// position (the pass-through metadata join).
fn resolve_names(rows: &[Row], ids: &[i64], dn_prop: &str) -> Value {
    let names: Vec<&str> = dn_prop.split(',').map(str::trim).collect();
    let resolved = rows
        .iter()
        .filter_map(|row| {
            let id = row.get("id").and_then(Value::as_i64)?;
            let position = ids.iter().position(|candidate| *candidate == id)?;
            let name = names.get(position)?;
            let (dn, prop) = name.split_once('.').unwrap_or((name, ""));
            Some(serde_json::json!({
                "ts": row.get("ts").cloned().unwrap_or(Value::Null),
                "dn": dn,
                "prop": prop,
                "val": row.get("val").cloned().unwrap_or(Value::Null),
            }))
        })
        .collect();
    Value::Array(resolved)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Builds a row object from id/ts/val.
    fn row(id: i64, ts: i64, val: Value) -> Row {
        let Value::Object(map) = json!({"id": id, "ts": ts, "val": val}) else {
            unreachable!("object literal");
        };
        map
    }

    #[test]
    fn trend_reshape_matches_wire_scenario() {
        let filter = ReadFilter {
            ids: Some("1,2".to_string()),
            start: Some(1000),
            end: Some(2000),
            target: Some("trend".to_string()),
            ..ReadFilter::default()
        };
        let rows = vec![row(1, 1000, json!(5)), row(2, 1000, json!(7)), row(1, 1500, json!(9))];
        let payload = reshape(&filter, rows);
        assert_eq!(payload, json!([[1000, 5, 7], [1500, 9, null]]));
    }

    #[test]
    fn metadata_join_restores_names_by_position() {
        let filter = ReadFilter {
            ids: Some("11,12".to_string()),
            dn_prop: Some("DT101.value,DT102.state".to_string()),
            ..ReadFilter::default()
        };
        let rows = vec![row(12, 500, json!("on"))];
        let payload = reshape(&filter, rows);
        assert_eq!(
            payload,
            json!([{"ts": 500, "dn": "DT102", "prop": "state", "val": "on"}])
        );
    }

    #[test]
    fn raw_reads_pass_rows_through() {
        let filter = ReadFilter {
            sql: Some("select 1".to_string()),
            target: Some("trend".to_string()),
            ..ReadFilter::default()
        };
        let rows = vec![row(1, 10, json!(2))];
        let payload = reshape(&filter, rows);
        assert_eq!(payload, json!([{"id": 1, "ts": 10, "val": 2}]));
    }
}
