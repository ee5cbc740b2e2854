// crates/historian-core/tests/proptest_builders.rs
// ============================================================================
// Module: Builder and Pivot Property-Based Tests
// Description: Property tests for statement builders and the trend pivot.
// Purpose: Detect panics and shape invariants across wide input ranges.
// ============================================================================

//! Property-based tests for query builder and pivot invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use historian_core::DELETE_CHUNK_MAX;
use historian_core::RetentionKey;
use historian_core::Row;
use historian_core::SqlValue;
use historian_core::TableKind;
use historian_core::build_delete_chunk;
use historian_core::build_insert;
use historian_core::pivot_trend;
use proptest::prelude::*;
use serde_json::Value;
use serde_json::json;

/// Builds a point-record row object.
fn point(id: i64, ts: i64, val: f64) -> Value {
    json!({"id": id, "ts": ts, "val": val})
}

/// Converts a JSON object literal into a gateway row.
fn as_row(value: Value) -> Row {
    let Value::Object(map) = value else {
        panic!("expected object");
    };
    map
}

proptest! {
    #[test]
    fn insert_binds_one_tuple_per_complete_row(
        rows in prop::collection::vec((any::<i64>(), 0_i64 .. i64::MAX / 2, any::<f64>().prop_filter("finite", |v| v.is_finite())), 1 .. 40),
    ) {
        let payload: Vec<Value> = rows.iter().map(|(id, ts, val)| point(*id, *ts, *val)).collect();
        let stmt = build_insert(TableKind::Records, &payload).expect("non-empty batch");
        let per_row = TableKind::Records.schema().columns.len();
        prop_assert_eq!(stmt.params.len(), rows.len() * per_row);
        prop_assert_eq!(stmt.sql.matches("(?").count(), rows.len());
    }

    #[test]
    fn insert_drops_rows_missing_required_columns(
        complete in 0_usize .. 10,
        broken in 1_usize .. 10,
    ) {
        let mut payload: Vec<Value> = (0 .. complete)
            .map(|index| {
                let index = i64::try_from(index).expect("small index");
                point(index, 1_000 + index, 1.0)
            })
            .collect();
        payload.extend((0 .. broken).map(|index| json!({"id": index, "val": 1.0})));
        let stmt = build_insert(TableKind::Records, &payload);
        match stmt {
            Some(stmt) => {
                let per_row = TableKind::Records.schema().columns.len();
                prop_assert_eq!(stmt.params.len(), complete * per_row);
            }
            None => prop_assert_eq!(complete, 0),
        }
    }

    #[test]
    fn delete_chunks_never_exceed_the_cap(
        ids in prop::collection::vec(any::<i64>(), 1 .. 1_600),
        cutoff in 0_i64 .. i64::MAX / 2,
    ) {
        let keys: Vec<RetentionKey> = ids.iter().copied().map(RetentionKey::Id).collect();
        for chunk in keys.chunks(DELETE_CHUNK_MAX) {
            prop_assert!(chunk.len() <= DELETE_CHUNK_MAX);
            let stmt = build_delete_chunk(TableKind::Records, chunk, cutoff).expect("non-empty chunk");
            // One bound parameter per id plus the trailing cutoff.
            prop_assert_eq!(stmt.params.len(), chunk.len() + 1);
            prop_assert_eq!(stmt.params.last(), Some(&SqlValue::Integer(cutoff)));
        }
    }

    #[test]
    fn pivot_width_is_series_count_plus_timestamp(
        ids in prop::collection::vec(1_i64 .. 50, 1 .. 6),
        points in prop::collection::vec((1_i64 .. 50, 0_i64 .. 10_000, any::<f64>().prop_filter("finite", |v| v.is_finite())), 0 .. 60),
    ) {
        let mut rows: Vec<Row> = points
            .iter()
            .map(|(id, ts, val)| as_row(point(*id, *ts, *val)))
            .collect();
        rows.sort_by_key(|row| row.get("ts").and_then(Value::as_i64).unwrap_or(0));
        let tuples = pivot_trend(&rows, &ids);
        let mut last_ts = i64::MIN;
        for tuple in &tuples {
            prop_assert_eq!(tuple.len(), ids.len() + 1);
            let ts = tuple[0].as_i64().expect("timestamp slot");
            prop_assert!(ts > last_ts, "one tuple per timestamp, ascending");
            last_ts = ts;
        }
    }
}
