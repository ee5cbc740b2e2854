// crates/historian-store/src/gateway.rs
// ============================================================================
// Module: SQLite Gateway
// Description: Pooled SQLite implementation of the storage gateway.
// Purpose: Execute parameterized statements for the historian agent.
// Dependencies: historian-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! One writer connection guarded by a mutex plus a small pool of read-only
//! connections selected round-robin; all connections run WAL with a busy
//! timeout. Result rows are decoded into JSON objects keyed by column name
//! so the agent can reshape or forward them without driver types.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use historian_core::GatewayError;
use historian_core::Row;
use historian_core::SqlValue;
use historian_core::Statement;
use historian_core::StorageGateway;
use historian_core::TableKind;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::ToSql;
use rusqlite::params_from_iter;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default read connection pool size.
const DEFAULT_READ_POOL_SIZE: usize = 4;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` gateway.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `read_pool_size` must be greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteGatewayConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Number of read-only connections.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` gateway errors.
///
/// # Invariants
/// - Messages avoid embedding bound parameter values.
#[derive(Debug, Error, Clone)]
pub enum SqliteGatewayError {
    /// Connection could not be opened or configured.
    #[error("sqlite open error: {0}")]
    Open(String),
    /// Configuration rejected before opening.
    #[error("sqlite config error: {0}")]
    Config(String),
}

impl From<SqliteGatewayError> for GatewayError {
    fn from(error: SqliteGatewayError) -> Self {
        Self::Connection(error.to_string())
    }
}

// ============================================================================
// SECTION: Gateway
// ============================================================================

/// `SQLite`-backed storage gateway.
///
/// # Invariants
/// - Writes are serialized through the single writer connection.
/// - Read connections never execute mutating statements.
#[derive(Clone)]
pub struct SqliteGateway {
    /// Writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Read-only connection pool.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
}

impl SqliteGateway {
    /// Opens the gateway: one writer plus the configured read pool.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteGatewayError`] when the database cannot be opened or
    /// a pragma fails.
    pub fn open(config: &SqliteGatewayConfig) -> Result<Self, SqliteGatewayError> {
        if config.read_pool_size == 0 {
            return Err(SqliteGatewayError::Config(
                "read_pool_size must be greater than zero".to_string(),
            ));
        }
        let write_connection = open_connection(config)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_connection(config)?));
        }
        Ok(Self {
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the next read connection using round-robin selection.
    fn read_connection(&self) -> &Mutex<Connection> {
        let len = self.read_connections.len();
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % len;
        &self.read_connections[index]
    }
}

impl StorageGateway for SqliteGateway {
    fn execute(&self, stmt: &Statement) -> Result<Vec<Row>, GatewayError> {
        let guard = self
            .read_connection()
            .lock()
            .map_err(|_| GatewayError::Connection("read mutex poisoned".to_string()))?;
        let mut prepared =
            guard.prepare(&stmt.sql).map_err(|err| GatewayError::Query(err.to_string()))?;
        let column_names: Vec<String> =
            prepared.column_names().iter().map(ToString::to_string).collect();
        let mut rows = prepared
            .query(params_from_iter(stmt.params.iter().map(Bound)))
            .map_err(|err| GatewayError::Query(err.to_string()))?;
        let mut decoded = Vec::new();
        while let Some(row) = rows.next().map_err(|err| GatewayError::Query(err.to_string()))? {
            let mut object = Row::new();
            for (index, name) in column_names.iter().enumerate() {
                let value = row
                    .get_ref(index)
                    .map_err(|err| GatewayError::Decode(err.to_string()))?;
                object.insert(name.clone(), decode_value(value)?);
            }
            decoded.push(object);
        }
        Ok(decoded)
    }

    fn run(&self, stmt: &Statement) -> Result<u64, GatewayError> {
        let guard = self
            .write_connection
            .lock()
            .map_err(|_| GatewayError::Connection("write mutex poisoned".to_string()))?;
        let affected = guard
            .execute(&stmt.sql, params_from_iter(stmt.params.iter().map(Bound)))
            .map_err(|err| GatewayError::Query(err.to_string()))?;
        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }

    fn database_size_bytes(&self) -> Result<u64, GatewayError> {
        let guard = self
            .read_connection()
            .lock()
            .map_err(|_| GatewayError::Connection("read mutex poisoned".to_string()))?;
        let page_count: i64 = guard
            .pragma_query_value(None, "page_count", |row| row.get(0))
            .map_err(|err| GatewayError::Query(err.to_string()))?;
        let page_size: i64 = guard
            .pragma_query_value(None, "page_size", |row| row.get(0))
            .map_err(|err| GatewayError::Query(err.to_string()))?;
        let bytes = page_count.saturating_mul(page_size);
        Ok(u64::try_from(bytes).unwrap_or(0))
    }

    fn row_count(&self, table: &str) -> Result<u64, GatewayError> {
        // Table names are never caller-controlled; refuse anything outside
        // the static registry before interpolating.
        let kind = TableKind::from_table_name(table)
            .ok_or_else(|| GatewayError::Query(format!("unknown table {table}")))?;
        let guard = self
            .read_connection()
            .lock()
            .map_err(|_| GatewayError::Connection("read mutex poisoned".to_string()))?;
        let count: i64 = guard
            .query_row(&format!("SELECT COUNT(*) FROM {}", kind.schema().table), [], |row| {
                row.get(0)
            })
            .map_err(|err| GatewayError::Query(err.to_string()))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

// ============================================================================
// SECTION: Binding & Decoding
// ============================================================================

/// Adapter binding a [`SqlValue`] as a `rusqlite` parameter.
struct Bound<'a>(&'a SqlValue);

impl ToSql for Bound<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            SqlValue::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            SqlValue::Integer(value) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Integer(*value))
            }
            SqlValue::Real(value) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*value)),
            SqlValue::Text(value) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Text(value.clone()))
            }
        })
    }
}

/// Decodes a driver value into JSON.
fn decode_value(value: ValueRef<'_>) -> Result<Value, GatewayError> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => {
            serde_json::Number::from_f64(real).map_or(Value::Null, Value::Number)
        }
        ValueRef::Text(bytes) => Value::String(
            String::from_utf8(bytes.to_vec())
                .map_err(|err| GatewayError::Decode(err.to_string()))?,
        ),
        ValueRef::Blob(bytes) => {
            return Err(GatewayError::Decode(format!("unexpected blob of {} bytes", bytes.len())));
        }
    })
}

// ============================================================================
// SECTION: Connections
// ============================================================================

/// Opens and configures one connection.
fn open_connection(config: &SqliteGatewayConfig) -> Result<Connection, SqliteGatewayError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteGatewayError::Open(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteGatewayError::Open(err.to_string()))?;
    connection
        .pragma_update(None, "journal_mode", "wal")
        .map_err(|err| SqliteGatewayError::Open(err.to_string()))?;
    Ok(connection)
}
