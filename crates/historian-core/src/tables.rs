// crates/historian-core/src/tables.rs
// ============================================================================
// Module: Table Registry
// Description: Static registry of logical table kinds.
// Purpose: Map each table kind to its columns, DDL, and reshape policy.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Each logical table kind has a fixed, versionless DDL (create-if-absent)
//! and a fixed column ordering used for batch inserts; adding a column
//! requires updating both together. The registry is compiled into static
//! [`TableSchema`] values; handlers perform mapping reads instead of
//! branching on table names.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Column Specs
// ============================================================================

/// Value coercion policy applied when binding a column during inserts.
///
/// # Invariants
/// - Variants are stable; the query builder matches on them exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Integer-valued column (timestamps, ids, levels).
    Integer,
    /// Column bound by the JSON type of the incoming value: numbers bind
    /// numerically, everything else binds as text.
    Value,
    /// Text column.
    Text,
    /// JSON payload column, stored as serialized text.
    Json,
    /// Timestamp-derived column: the bound epoch-millisecond value is
    /// wrapped in a store-side conversion expression.
    TimestampMs,
}

/// One column of a logical table.
///
/// # Invariants
/// - `name` matches the DDL column name exactly (unquoted form).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name as it appears in incoming row objects.
    pub name: &'static str,
    /// Binding coercion for the column.
    pub coercion: Coercion,
}

/// Shorthand constructor used by the registry tables below.
const fn col(name: &'static str, coercion: Coercion) -> ColumnSpec {
    ColumnSpec { name, coercion }
}

// ============================================================================
// SECTION: Table Kinds
// ============================================================================

/// Logical table kinds provisioned and served by the agent.
///
/// # Invariants
/// - Variants are stable labels used in envelopes and procinfo payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Numeric point records keyed by series id.
    Records,
    /// String-valued point records keyed by series id.
    StrRecords,
    /// Timeline events keyed by device name and property.
    Timeline,
    /// Custom JSON records with partial-update support.
    Custom,
    /// Formula definitions.
    Formulas,
    /// Id registry mapping series ids to device name/property pairs.
    IdMap,
    /// Main log table.
    MainLog,
    /// Plugin log table.
    PluginLog,
    /// Device log table.
    DeviceLog,
    /// Security log table.
    SecLog,
}

impl TableKind {
    /// All registered kinds, in provisioning order.
    pub const ALL: [Self; 10] = [
        Self::Records,
        Self::StrRecords,
        Self::Timeline,
        Self::Custom,
        Self::Formulas,
        Self::IdMap,
        Self::MainLog,
        Self::PluginLog,
        Self::DeviceLog,
        Self::SecLog,
    ];

    /// Log table kinds, targeted by the log retention variant.
    pub const LOGS: [Self; 4] = [Self::MainLog, Self::PluginLog, Self::DeviceLog, Self::SecLog];

    /// Resolves a kind from a physical table name in an envelope.
    #[must_use]
    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.schema().table == name)
    }

    /// Returns the static schema for the kind.
    #[must_use]
    pub const fn schema(self) -> &'static TableSchema {
        match self {
            Self::Records => &RECORDS,
            Self::StrRecords => &STR_RECORDS,
            Self::Timeline => &TIMELINE,
            Self::Custom => &CUSTOM,
            Self::Formulas => &FORMULAS,
            Self::IdMap => &ID_MAP,
            Self::MainLog => &MAIN_LOG,
            Self::PluginLog => &PLUGIN_LOG,
            Self::DeviceLog => &DEVICE_LOG,
            Self::SecLog => &SEC_LOG,
        }
    }
}

// ============================================================================
// SECTION: Table Schemas
// ============================================================================

/// Static description of one logical table.
///
/// # Invariants
/// - `columns` ordering matches the multi-row insert column list.
/// - `required` names a non-null timestamp plus the row-owning key; rows
///   missing any of them are dropped from insert batches.
/// - `time_column` is the ascending ordering column for structured reads
///   and the age column for retention cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    /// Physical table name.
    pub table: &'static str,
    /// Ordered insert column list.
    pub columns: &'static [ColumnSpec],
    /// Columns that must be present for a row to enter a batch.
    pub required: &'static [&'static str],
    /// DDL body, without the `CREATE TABLE` wrapper.
    pub ddl_body: &'static str,
    /// Ordering and retention-age column.
    pub time_column: &'static str,
    /// Whether structured reads support the trend pivot.
    pub trend_capable: bool,
    /// Whether the table participates in log retention and the safety cap.
    pub is_log: bool,
}

impl TableSchema {
    /// Returns the idempotent create statement for the table.
    #[must_use]
    pub fn create_ddl(&self) -> String {
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.table, self.ddl_body)
    }
}

/// Numeric point records.
static RECORDS: TableSchema = TableSchema {
    table: "records",
    columns: &[
        col("id", Coercion::Integer),
        col("ts", Coercion::Integer),
        col("val", Coercion::Value),
        col("q", Coercion::Integer),
    ],
    required: &["id", "ts"],
    ddl_body: "id integer NOT NULL, ts bigint NOT NULL, val real, q integer",
    time_column: "ts",
    trend_capable: true,
    is_log: false,
};

/// String-valued point records.
static STR_RECORDS: TableSchema = TableSchema {
    table: "strecords",
    columns: &[
        col("id", Coercion::Integer),
        col("ts", Coercion::Integer),
        col("val", Coercion::Value),
    ],
    required: &["id", "ts"],
    ddl_body: "id integer NOT NULL, ts bigint NOT NULL, val text",
    time_column: "ts",
    trend_capable: true,
    is_log: false,
};

/// Timeline events.
static TIMELINE: TableSchema = TableSchema {
    table: "timeline",
    columns: &[
        col("dn", Coercion::Text),
        col("prop", Coercion::Text),
        col("start", Coercion::Integer),
        col("end", Coercion::Integer),
        col("state", Coercion::Text),
    ],
    required: &["dn", "start"],
    ddl_body: "id integer PRIMARY KEY, dn text NOT NULL, prop text, \
               start bigint NOT NULL, \"end\" bigint, state text",
    time_column: "start",
    trend_capable: false,
    is_log: false,
};

/// Custom JSON records. `tstz` is derived store-side from `ts`.
static CUSTOM: TableSchema = TableSchema {
    table: "customtable",
    columns: &[
        col("name", Coercion::Text),
        col("ts", Coercion::Integer),
        col("tstz", Coercion::TimestampMs),
        col("payload", Coercion::Json),
    ],
    required: &["name", "ts"],
    ddl_body: "id integer PRIMARY KEY, name text NOT NULL, ts bigint NOT NULL, \
               tstz text, payload text",
    time_column: "ts",
    trend_capable: false,
    is_log: false,
};

/// Formula definitions.
static FORMULAS: TableSchema = TableSchema {
    table: "formulas",
    columns: &[col("name", Coercion::Text), col("formula", Coercion::Text)],
    required: &["name"],
    ddl_body: "id integer PRIMARY KEY, name text NOT NULL, formula text",
    time_column: "id",
    trend_capable: false,
    is_log: false,
};

/// Id registry mapping series ids to device name/property pairs.
static ID_MAP: TableSchema = TableSchema {
    table: "idmap",
    columns: &[
        col("id", Coercion::Integer),
        col("dn", Coercion::Text),
        col("prop", Coercion::Text),
    ],
    required: &["id", "dn"],
    ddl_body: "id integer PRIMARY KEY, dn text NOT NULL, prop text",
    time_column: "id",
    trend_capable: false,
    is_log: false,
};

/// Main log table.
static MAIN_LOG: TableSchema = TableSchema {
    table: "mainlog",
    columns: &[
        col("tags", Coercion::Text),
        col("did", Coercion::Text),
        col("location", Coercion::Text),
        col("txt", Coercion::Text),
        col("level", Coercion::Integer),
        col("ts", Coercion::Integer),
        col("tsid", Coercion::Text),
        col("sender", Coercion::Text),
    ],
    required: &["ts"],
    ddl_body: "tags text, did text, location text, txt text, level integer, \
               ts bigint NOT NULL, tsid text, sender text",
    time_column: "ts",
    trend_capable: false,
    is_log: true,
};

/// Plugin log table.
static PLUGIN_LOG: TableSchema = TableSchema {
    table: "pluginlog",
    columns: &[
        col("unit", Coercion::Text),
        col("txt", Coercion::Text),
        col("level", Coercion::Integer),
        col("ts", Coercion::Integer),
        col("tsid", Coercion::Text),
        col("sender", Coercion::Text),
    ],
    required: &["ts"],
    ddl_body: "unit text, txt text, level integer, ts bigint NOT NULL, \
               tsid text, sender text",
    time_column: "ts",
    trend_capable: false,
    is_log: true,
};

/// Device log table.
static DEVICE_LOG: TableSchema = TableSchema {
    table: "devicelog",
    columns: &[
        col("did", Coercion::Text),
        col("prop", Coercion::Text),
        col("val", Coercion::Value),
        col("txt", Coercion::Text),
        col("ts", Coercion::Integer),
        col("tsid", Coercion::Text),
        col("cmd", Coercion::Text),
        col("sender", Coercion::Text),
    ],
    required: &["ts"],
    ddl_body: "did text, prop text, val text, txt text, ts bigint NOT NULL, \
               tsid text, cmd text, sender text",
    time_column: "ts",
    trend_capable: false,
    is_log: true,
};

/// Security log table.
static SEC_LOG: TableSchema = TableSchema {
    table: "iseclog",
    columns: &[
        col("type", Coercion::Text),
        col("msg", Coercion::Text),
        col("subjid", Coercion::Text),
        col("subjname", Coercion::Text),
        col("objid", Coercion::Text),
        col("objname", Coercion::Text),
        col("result", Coercion::Text),
        col("changed", Coercion::Text),
        col("ip", Coercion::Text),
        col("app", Coercion::Text),
        col("class", Coercion::Text),
        col("version", Coercion::Text),
        col("level", Coercion::Integer),
        col("ts", Coercion::Integer),
        col("tsid", Coercion::Text),
        col("sender", Coercion::Text),
    ],
    required: &["ts"],
    ddl_body: "type text, msg text, subjid text, subjname text, objid text, \
               objname text, result text, changed text, ip text, app text, \
               class text, version text, level integer, ts bigint NOT NULL, \
               tsid text, sender text",
    time_column: "ts",
    trend_capable: false,
    is_log: true,
};

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_resolves_by_table_name() {
        for kind in TableKind::ALL {
            let schema = kind.schema();
            assert_eq!(TableKind::from_table_name(schema.table), Some(kind));
        }
    }

    #[test]
    fn required_columns_exist_in_column_list() {
        for kind in TableKind::ALL {
            let schema = kind.schema();
            for required in schema.required {
                assert!(
                    schema.columns.iter().any(|column| column.name == *required),
                    "{required} missing from {}",
                    schema.table
                );
            }
        }
    }

    #[test]
    fn ddl_is_idempotent_create() {
        for kind in TableKind::ALL {
            assert!(kind.schema().create_ddl().starts_with("CREATE TABLE IF NOT EXISTS "));
        }
    }

    #[test]
    fn security_log_resolves_by_wire_name() {
        assert_eq!(TableKind::from_table_name("iseclog"), Some(TableKind::SecLog));
        assert_eq!(TableKind::from_table_name("seclog"), None);
    }

    #[test]
    fn log_kinds_are_flagged() {
        for kind in TableKind::LOGS {
            assert!(kind.schema().is_log);
        }
        assert!(!TableKind::Records.schema().is_log);
    }
}
