// crates/historian-core/src/trend.rs
// ============================================================================
// Module: Trend Reshaping
// Description: Pivot of narrow series rows into wide chart tuples.
// Purpose: Serve chart-trend reads without post-processing on the peer.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Chart reads reshape narrow `(ts, series, value)` rows into wide tuples
//! `[ts, v1, .., vN]`. Series index is resolved by position in the
//! caller-supplied identifier list, never by value content. Rows must
//! arrive in ascending timestamp order; rows sharing a timestamp are merged
//! into the most recently emitted tuple regardless of arrival order within
//! that timestamp group.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::gateway::Row;

// ============================================================================
// SECTION: Pivot
// ============================================================================

/// Pivots rows for a multi-series trend read.
///
/// Rows without an id or timestamp, and rows whose id is not in the caller
/// list, are skipped. Absent series observations stay `null` in the tuple.
#[must_use]
pub fn pivot_trend(rows: &[Row], ids: &[i64]) -> Vec<Vec<Value>> {
    if ids.is_empty() || rows.is_empty() {
        return Vec::new();
    }
    let width = ids.len() + 1;
    let mut tuples: Vec<Vec<Value>> = Vec::new();
    let mut last_ts: Option<i64> = None;

    for row in rows {
        let Some(id) = row.get("id").and_then(Value::as_i64) else {
            continue;
        };
        let Some(ts) = row.get("ts").and_then(Value::as_i64) else {
            continue;
        };
        let Some(series) = ids.iter().position(|candidate| *candidate == id) else {
            continue;
        };
        let mut tuple = if last_ts == Some(ts) {
            tuples.pop().unwrap_or_else(|| blank_tuple(width, ts))
        } else {
            last_ts = Some(ts);
            blank_tuple(width, ts)
        };
        tuple[series + 1] = row.get("val").cloned().unwrap_or(Value::Null);
        tuples.push(tuple);
    }
    tuples
}

/// Returns a fresh all-null tuple headed by the timestamp.
fn blank_tuple(width: usize, ts: i64) -> Vec<Value> {
    let mut tuple = vec![Value::Null; width];
    tuple[0] = Value::from(ts);
    tuple
}

/// Reshapes rows for a single-series trend read: `[ts, val]` pairs with
/// numeric coercion of string values where they parse.
#[must_use]
pub fn single_series(rows: &[Row]) -> Vec<Vec<Value>> {
    rows.iter()
        .filter_map(|row| {
            let ts = row.get("ts").and_then(Value::as_i64)?;
            let val = row.get("val").cloned().unwrap_or(Value::Null);
            Some(vec![Value::from(ts), coerce_numeric(val)])
        })
        .collect()
}

/// Coerces string values that parse as numbers; leaves everything else.
fn coerce_numeric(value: Value) -> Value {
    match value {
        Value::String(text) => text
            .parse::<f64>()
            .ok()
            .and_then(|number| serde_json::Number::from_f64(number).map(Value::Number))
            .unwrap_or(Value::String(text)),
        other => other,
    }
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
    fn pivot_merges_rows_sharing_a_timestamp() {
        let rows = vec![
            row(1, 1000, json!(5)),
            row(2, 1000, json!(7)),
            row(1, 1500, json!(9)),
        ];
        let tuples = pivot_trend(&rows, &[1, 2]);
        assert_eq!(
            tuples,
            vec![vec![json!(1000), json!(5), json!(7)], vec![json!(1500), json!(9), json!(null)]]
        );
    }

    #[test]
    fn pivot_width_is_series_count_plus_one() {
        let rows = vec![row(3, 10, json!(1.5))];
        let tuples = pivot_trend(&rows, &[1, 2, 3]);
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0].len(), 4);
        assert_eq!(tuples[0][3], json!(1.5));
    }

    #[test]
    fn pivot_emits_at_most_one_tuple_per_timestamp() {
        let rows = vec![
            row(1, 100, json!(1)),
            row(2, 100, json!(2)),
            row(1, 200, json!(3)),
            row(2, 200, json!(4)),
        ];
        let tuples = pivot_trend(&rows, &[1, 2]);
        let mut stamps: Vec<i64> =
            tuples.iter().filter_map(|tuple| tuple[0].as_i64()).collect();
        stamps.dedup();
        assert_eq!(stamps.len(), tuples.len());
    }

    #[test]
    fn pivot_skips_unknown_series_and_broken_rows() {
        let mut broken = Row::new();
        broken.insert("val".to_string(), json!(1));
        let rows = vec![row(9, 100, json!(1)), broken];
        assert!(pivot_trend(&rows, &[1, 2]).is_empty());
    }

    #[test]
    fn single_series_coerces_numeric_strings() {
        let rows = vec![row(1, 100, json!("20.5")), row(1, 200, json!("on"))];
        let pairs = single_series(&rows);
        assert_eq!(pairs, vec![vec![json!(100), json!(20.5)], vec![json!(200), json!("on")]]);
    }
}
