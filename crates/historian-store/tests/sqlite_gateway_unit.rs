// crates/historian-store/tests/sqlite_gateway_unit.rs
// ============================================================================
// Module: SQLite Gateway Unit Tests
// Description: Targeted tests for the gateway and schema manager.
// Purpose: Validate provisioning idempotence, statement execution, decoding,
//          and retention delete semantics against a real store.
// ============================================================================

//! ## Overview
//! Integration-level tests for the `SQLite` gateway:
//! - Schema provisioning is idempotent (create-if-absent DDL)
//! - Parameterized inserts and ordered selects round-trip
//! - Retention deletes honor the age cutoff and are idempotent
//! - JSON patch updates rewrite only the addressed field
//! - Size and row-count probes answer sanely

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

use historian_core::ReadFilter;
use historian_core::RetentionKey;
use historian_core::Statement;
use historian_core::StorageGateway;
use historian_core::TableKind;
use historian_core::build_delete_chunk;
use historian_core::build_insert;
use historian_core::build_json_patch;
use historian_core::build_select;
use historian_store::SqliteGateway;
use historian_store::SqliteGatewayConfig;
use historian_store::provision_schema;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open_gateway(dir: &TempDir) -> SqliteGateway {
    let config = SqliteGatewayConfig {
        path: dir.path().join("historian.db"),
        busy_timeout_ms: 1_000,
        read_pool_size: 2,
    };
    let gateway = SqliteGateway::open(&config).expect("open gateway");
    provision_schema(&gateway).expect("provision schema");
    gateway
}

fn insert_points(gateway: &SqliteGateway, rows: &[serde_json::Value]) {
    let stmt = build_insert(TableKind::Records, rows).expect("non-empty batch");
    gateway.run(&stmt).expect("insert");
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn provisioning_twice_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let gateway = open_gateway(&dir);
    provision_schema(&gateway).expect("second provision");
    for kind in TableKind::ALL {
        assert_eq!(gateway.row_count(kind.schema().table).expect("count"), 0);
    }
}

#[test]
fn insert_and_ordered_select_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    let gateway = open_gateway(&dir);
    insert_points(
        &gateway,
        &[
            json!({"id": 1, "ts": 1500, "val": 9.0}),
            json!({"id": 1, "ts": 1000, "val": 5.0}),
            json!({"id": 2, "ts": 1000, "val": 7.0}),
        ],
    );

    let filter = ReadFilter {
        ids: Some("1,2".to_string()),
        start: Some(1000),
        end: Some(2000),
        ..ReadFilter::default()
    };
    let rows = gateway
        .execute(&build_select(&filter).expect("select"))
        .expect("execute");
    assert_eq!(rows.len(), 3);
    let stamps: Vec<i64> =
        rows.iter().map(|row| row["ts"].as_i64().expect("ts")).collect();
    assert_eq!(stamps, vec![1000, 1000, 1500], "ascending timestamp order");
}

#[test]
fn retention_delete_honors_cutoff_and_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let gateway = open_gateway(&dir);
    insert_points(
        &gateway,
        &[
            json!({"id": 9, "ts": 100, "val": 1.0}),
            json!({"id": 9, "ts": 900, "val": 2.0}),
            json!({"id": 8, "ts": 100, "val": 3.0}),
        ],
    );

    let chunk = vec![RetentionKey::Id(9)];
    let stmt = build_delete_chunk(TableKind::Records, &chunk, 500).expect("statement");
    assert_eq!(gateway.run(&stmt).expect("first delete"), 1, "only rows older than cutoff");
    assert_eq!(gateway.run(&stmt).expect("second delete"), 0, "second run is a no-op");
    assert_eq!(gateway.row_count("records").expect("count"), 2);
}

#[test]
fn json_patch_rewrites_only_the_addressed_field() {
    let dir = TempDir::new().expect("tempdir");
    let gateway = open_gateway(&dir);
    let rows = vec![json!({
        "name": "recipe",
        "ts": 1000,
        "payload": {"head": {"Weight": "70", "Name": "A"}}
    })];
    let stmt = build_insert(TableKind::Custom, &rows).expect("batch");
    gateway.run(&stmt).expect("insert");

    let id = gateway
        .execute(&Statement::raw("SELECT id FROM customtable".to_string()))
        .expect("ids")[0]["id"]
        .as_i64()
        .expect("id");
    let patch = build_json_patch(TableKind::Custom, id, "head.Weight", &json!("80"), false)
        .expect("patch");
    assert_eq!(gateway.run(&patch).expect("update"), 1);

    let payload = gateway
        .execute(&Statement::raw("SELECT payload FROM customtable".to_string()))
        .expect("rows")[0]["payload"]
        .clone();
    let decoded: serde_json::Value =
        serde_json::from_str(payload.as_str().expect("text payload")).expect("json");
    assert_eq!(decoded["head"]["Weight"], json!("80"));
    assert_eq!(decoded["head"]["Name"], json!("A"), "untouched sibling survives");
}

#[test]
fn size_probe_and_unknown_table_guard() {
    let dir = TempDir::new().expect("tempdir");
    let gateway = open_gateway(&dir);
    assert!(gateway.database_size_bytes().expect("size") > 0);
    assert!(gateway.row_count("not_a_table").is_err());
}

#[test]
fn raw_sql_passthrough_executes_verbatim() {
    let dir = TempDir::new().expect("tempdir");
    let gateway = open_gateway(&dir);
    insert_points(&gateway, &[json!({"id": 4, "ts": 10, "val": 1.0})]);
    let filter = ReadFilter {
        sql: Some("SELECT COUNT(*) AS n FROM records".to_string()),
        ..ReadFilter::default()
    };
    let rows = gateway
        .execute(&build_select(&filter).expect("raw"))
        .expect("execute");
    assert_eq!(rows[0]["n"], json!(1));
}
