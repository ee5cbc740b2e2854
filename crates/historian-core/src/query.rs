// crates/historian-core/src/query.rs
// ============================================================================
// Module: Query Builder
// Description: Pure translation of structured requests into SQL statements.
// Purpose: Emit parameterized statement text; never execute anything.
// Dependencies: serde_json, historian-core tables/envelope/error
// ============================================================================

//! ## Overview
//! Every caller-controlled value is a bound parameter; the only text
//! interpolated into statements comes from the static table registry or
//! from validated JSON path segments. Empty identifier lists and empty
//! payloads yield a no-op (`None`), not an error — callers must check
//! before invoking the gateway.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::envelope::ReadFilter;
use crate::error::AgentError;
use crate::policy::RetentionKey;
use crate::tables::Coercion;
use crate::tables::TableKind;

// ============================================================================
// SECTION: Statement Types
// ============================================================================

/// A parameter value bound to a statement placeholder.
///
/// # Invariants
/// - Variants map 1:1 to the store's scalar binding types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// Double-precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
}

/// Statement text plus its ordered parameters.
///
/// # Invariants
/// - `params.len()` equals the number of `?` placeholders in `sql`.
/// - `columns` is the per-row column count for insert statements and zero
///   otherwise; callers use it for latency bucketing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Ordered bound parameters.
    pub params: Vec<SqlValue>,
    /// Columns per value tuple for inserts.
    pub columns: usize,
}

impl Statement {
    /// Builds a raw statement with no parameters.
    #[must_use]
    pub const fn raw(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
            columns: 0,
        }
    }
}

/// Quotes an identifier from the static registry for statement text.
fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

/// Binds a JSON value by its own type: numbers numerically, text quoted by
/// the driver, containers as serialized text.
fn bind_dynamic(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number
            .as_i64()
            .map_or_else(|| SqlValue::Real(number.as_f64().unwrap_or(0.0)), SqlValue::Integer),
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

// ============================================================================
// SECTION: Insert Builder
// ============================================================================

/// Builds a multi-row insert for the table kind.
///
/// Rows missing a required column (the row-owning key or the timestamp) are
/// silently dropped from the batch; a batch that yields zero value tuples
/// returns `None` and must not reach the gateway.
#[must_use]
pub fn build_insert(kind: TableKind, rows: &[Value]) -> Option<Statement> {
    let schema = kind.schema();
    let mut tuples = 0usize;
    let mut fragments: Vec<String> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();

    for row in rows {
        let Some(object) = row.as_object() else {
            continue;
        };
        let complete = schema
            .required
            .iter()
            .all(|name| object.get(*name).is_some_and(|value| !value.is_null()));
        if !complete {
            continue;
        }
        let mut placeholders: Vec<&'static str> = Vec::with_capacity(schema.columns.len());
        for column in schema.columns {
            let value = object.get(column.name).unwrap_or(&Value::Null);
            match column.coercion {
                Coercion::TimestampMs => {
                    // Derived store-side from the row timestamp.
                    let ts = object.get(schema.time_column).unwrap_or(&Value::Null);
                    placeholders.push("datetime(? / 1000, 'unixepoch')");
                    params.push(bind_dynamic(ts));
                }
                Coercion::Json => {
                    placeholders.push("?");
                    if value.is_null() {
                        params.push(SqlValue::Null);
                    } else {
                        params.push(SqlValue::Text(value.to_string()));
                    }
                }
                Coercion::Integer | Coercion::Value | Coercion::Text => {
                    placeholders.push("?");
                    params.push(bind_dynamic(value));
                }
            }
        }
        fragments.push(format!("({})", placeholders.join(",")));
        tuples += 1;
    }

    if tuples == 0 {
        return None;
    }
    let column_list =
        schema.columns.iter().map(|column| quote_ident(column.name)).collect::<Vec<_>>().join(",");
    Some(Statement {
        sql: format!(
            "INSERT INTO {} ({column_list}) VALUES {}",
            schema.table,
            fragments.join(", ")
        ),
        params,
        columns: schema.columns.len(),
    })
}

// ============================================================================
// SECTION: Select Builder
// ============================================================================

/// Builds a select from a structured filter, or passes raw SQL through.
///
/// # Errors
///
/// Returns [`AgentError::Validation`] when the structured filter names no
/// identifier set or carries unparseable ids.
pub fn build_select(filter: &ReadFilter) -> Result<Statement, AgentError> {
    if let Some(sql) = &filter.sql {
        return Ok(Statement::raw(sql.clone()));
    }

    let kind = select_kind(filter)?;
    let schema = kind.schema();
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();

    if let Some(ids) = &filter.ids {
        let parsed = parse_id_list(ids)?;
        let mut predicates: Vec<String> = Vec::with_capacity(parsed.len());
        for id in parsed {
            predicates.push(format!("{} = ?", quote_ident("id")));
            params.push(SqlValue::Integer(id));
        }
        clauses.push(parenthesize(predicates));
    } else if let Some(dn_prop) = &filter.dn_prop {
        let keys = parse_dn_prop_list(dn_prop)?;
        let mut predicates: Vec<String> = Vec::with_capacity(keys.len());
        for (dn, prop) in keys {
            match prop {
                Some(prop) => {
                    predicates.push(format!("({} = ? AND {} = ?)", quote_ident("dn"), quote_ident("prop")));
                    params.push(SqlValue::Text(dn));
                    params.push(SqlValue::Text(prop));
                }
                None => {
                    predicates.push(format!("{} = ?", quote_ident("dn")));
                    params.push(SqlValue::Text(dn));
                }
            }
        }
        clauses.push(parenthesize(predicates));
    }

    // Timeline rows overlap the window: the event must end after the range
    // start and begin before the range end.
    let (lower_column, upper_column) = if kind == TableKind::Timeline {
        ("end", "start")
    } else {
        (schema.time_column, schema.time_column)
    };
    if let Some(start) = filter.start {
        clauses.push(format!("{} >= ?", quote_ident(lower_column)));
        params.push(SqlValue::Integer(start));
    }
    if let Some(end) = filter.end {
        clauses.push(format!("{} <= ?", quote_ident(upper_column)));
        params.push(SqlValue::Integer(end));
    }
    // Only tables with a value column honor the not-null predicate.
    let has_val = schema.columns.iter().any(|column| column.name == "val");
    if filter.notnull_requested() && has_val {
        clauses.push(format!("{} IS NOT NULL", quote_ident("val")));
    }

    let where_clause =
        if clauses.is_empty() { String::new() } else { format!(" WHERE {}", clauses.join(" AND ")) };
    Ok(Statement {
        sql: format!(
            "SELECT * FROM {}{where_clause} ORDER BY {} ASC",
            schema.table,
            quote_ident(schema.time_column)
        ),
        params,
        columns: 0,
    })
}

/// Resolves the table kind a structured filter targets.
fn select_kind(filter: &ReadFilter) -> Result<TableKind, AgentError> {
    if let Some(table) = &filter.table {
        return TableKind::from_table_name(table)
            .ok_or_else(|| AgentError::Validation(format!("unknown table {table}")));
    }
    if filter.ids.is_some() {
        return Ok(TableKind::Records);
    }
    if filter.dn_prop.is_some() {
        return Ok(TableKind::Timeline);
    }
    Err(AgentError::Validation("expected ids or dn_prop in query".to_string()))
}

/// Parses a comma-separated id list into integers.
fn parse_id_list(raw: &str) -> Result<Vec<i64>, AgentError> {
    let mut ids = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id = part
            .parse::<i64>()
            .map_err(|_| AgentError::Validation(format!("bad id in query: {part}")))?;
        ids.push(id);
    }
    if ids.is_empty() {
        return Err(AgentError::Validation("expected ids in query".to_string()));
    }
    Ok(ids)
}

/// Parses a comma-separated `dn.prop` list; a bare `dn` matches every prop.
fn parse_dn_prop_list(raw: &str) -> Result<Vec<(String, Option<String>)>, AgentError> {
    let mut keys = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('.') {
            Some((dn, prop)) if !dn.is_empty() => {
                keys.push((dn.to_string(), Some(prop.to_string())));
            }
            Some(_) => {
                return Err(AgentError::Validation(format!("bad dn_prop in query: {part}")));
            }
            None => keys.push((part.to_string(), None)),
        }
    }
    if keys.is_empty() {
        return Err(AgentError::Validation("expected dn_prop in query".to_string()));
    }
    Ok(keys)
}

/// Parenthesizes multiple OR-combined predicates; single predicates pass
/// through bare.
fn parenthesize(predicates: Vec<String>) -> String {
    if predicates.len() == 1 {
        predicates.into_iter().next().unwrap_or_default()
    } else {
        format!("({})", predicates.join(" OR "))
    }
}

// ============================================================================
// SECTION: JSON Patch Builder
// ============================================================================

/// Builds a JSON-path partial update for one custom record.
///
/// The dotted/indexed field path is validated segment by segment and
/// rendered into a `json_set` path expression; the new value is always a
/// bound parameter, coerced to a number only when the caller flags the
/// field numeric.
///
/// # Errors
///
/// Returns [`AgentError::Validation`] for unknown path shapes or for a
/// numeric-flagged value that does not parse as a number.
pub fn build_json_patch(
    kind: TableKind,
    id: i64,
    field_path: &str,
    value: &Value,
    numeric: bool,
) -> Result<Statement, AgentError> {
    let schema = kind.schema();
    let path = render_json_path(field_path)?;
    let bound = if numeric { bind_numeric(value)? } else { bind_json_text(value) };
    Ok(Statement {
        sql: format!(
            "UPDATE {} SET {} = json_set({}, '{path}', ?) WHERE {} = ?",
            schema.table,
            quote_ident("payload"),
            quote_ident("payload"),
            quote_ident("id")
        ),
        params: vec![bound, SqlValue::Integer(id)],
        columns: 0,
    })
}

/// Renders a dotted/indexed field path as a JSON path expression.
fn render_json_path(field_path: &str) -> Result<String, AgentError> {
    if field_path.is_empty() {
        return Err(AgentError::Validation("empty field path".to_string()));
    }
    let mut rendered = String::from("$");
    for segment in field_path.split('.') {
        let (name, index) = split_index(segment)?;
        if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(AgentError::Validation(format!("bad field path segment: {segment}")));
        }
        rendered.push('.');
        rendered.push_str(name);
        if let Some(index) = index {
            rendered.push_str(&format!("[{index}]"));
        }
    }
    Ok(rendered)
}

/// Splits a trailing `[N]` index from a path segment.
fn split_index(segment: &str) -> Result<(&str, Option<u32>), AgentError> {
    let Some(open) = segment.find('[') else {
        return Ok((segment, None));
    };
    let Some(inner) = segment[open ..].strip_prefix('[').and_then(|rest| rest.strip_suffix(']'))
    else {
        return Err(AgentError::Validation(format!("bad field path segment: {segment}")));
    };
    let index = inner
        .parse::<u32>()
        .map_err(|_| AgentError::Validation(format!("bad array index in path: {segment}")))?;
    Ok((&segment[.. open], Some(index)))
}

/// Binds a patch value coerced to a number.
fn bind_numeric(value: &Value) -> Result<SqlValue, AgentError> {
    match value {
        Value::Number(number) => Ok(number
            .as_i64()
            .map_or_else(|| SqlValue::Real(number.as_f64().unwrap_or(0.0)), SqlValue::Integer)),
        Value::String(text) => text
            .parse::<f64>()
            .map(SqlValue::Real)
            .map_err(|_| AgentError::Validation(format!("expected numeric value, got {text}"))),
        other => Err(AgentError::Validation(format!("expected numeric value, got {other}"))),
    }
}

/// Binds a patch value as JSON text.
fn bind_json_text(value: &Value) -> SqlValue {
    match value {
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Null => SqlValue::Null,
        other => SqlValue::Text(other.to_string()),
    }
}

// ============================================================================
// SECTION: Delete Builders
// ============================================================================

/// Builds one chunked retention delete: OR-combined key equality restricted
/// to rows older than the cutoff. Empty chunks are a no-op.
#[must_use]
pub fn build_delete_chunk(
    kind: TableKind,
    chunk: &[RetentionKey],
    cutoff_ms: i64,
) -> Option<Statement> {
    if chunk.is_empty() {
        return None;
    }
    let schema = kind.schema();
    let mut params: Vec<SqlValue> = Vec::new();
    let mut predicates: Vec<String> = Vec::with_capacity(chunk.len());
    for key in chunk {
        match key {
            RetentionKey::Id(id) => {
                predicates.push(format!("{} = ?", quote_ident("id")));
                params.push(SqlValue::Integer(*id));
            }
            RetentionKey::DnProp { dn, prop } => {
                predicates
                    .push(format!("({} = ? AND {} = ?)", quote_ident("dn"), quote_ident("prop")));
                params.push(SqlValue::Text(dn.clone()));
                params.push(SqlValue::Text(prop.clone()));
            }
        }
    }
    params.push(SqlValue::Integer(cutoff_ms));
    Some(Statement {
        sql: format!(
            "DELETE FROM {} WHERE ({}) AND {} < ?",
            schema.table,
            predicates.join(" OR "),
            quote_ident(schema.time_column)
        ),
        params,
        columns: 0,
    })
}

/// Builds a log retention delete: level equality plus age cutoff.
#[must_use]
pub fn build_delete_by_level(kind: TableKind, level: i64, cutoff_ms: i64) -> Statement {
    let schema = kind.schema();
    Statement {
        sql: format!(
            "DELETE FROM {} WHERE {} = ? AND {} < ?",
            schema.table,
            quote_ident("level"),
            quote_ident(schema.time_column)
        ),
        params: vec![SqlValue::Integer(level), SqlValue::Integer(cutoff_ms)],
        columns: 0,
    }
}

/// Builds the unconditional safety delete for rows older than the cutoff.
#[must_use]
pub fn build_delete_older_than(kind: TableKind, cutoff_ms: i64) -> Statement {
    let schema = kind.schema();
    Statement {
        sql: format!(
            "DELETE FROM {} WHERE {} < ?",
            schema.table,
            quote_ident(schema.time_column)
        ),
        params: vec![SqlValue::Integer(cutoff_ms)],
        columns: 0,
    }
}

/// Builds a delete of specific rows by id. Empty id lists are a no-op.
#[must_use]
pub fn build_delete_by_ids(kind: TableKind, ids: &[i64]) -> Option<Statement> {
    if ids.is_empty() {
        return None;
    }
    let schema = kind.schema();
    let placeholders = vec!["?"; ids.len()].join(",");
    Some(Statement {
        sql: format!(
            "DELETE FROM {} WHERE {} IN ({placeholders})",
            schema.table,
            quote_ident("id")
        ),
        params: ids.iter().copied().map(SqlValue::Integer).collect(),
        columns: 0,
    })
}

/// Builds a delete of every row in the table.
#[must_use]
pub fn build_delete_all(kind: TableKind) -> Statement {
    Statement::raw(format!("DELETE FROM {}", kind.schema().table))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn insert_drops_rows_missing_key_or_timestamp() {
        let rows = vec![
            json!({"id": 5, "ts": 1000, "val": 3.2}),
            json!({"id": 6, "val": 1.0}),
            json!({"ts": 1000, "val": 2.0}),
        ];
        let stmt = build_insert(TableKind::Records, &rows)
            .unwrap_or_else(|| panic!("expected statement"));
        assert_eq!(stmt.sql.matches('(').count() - 1, 1, "one tuple expected: {}", stmt.sql);
        assert_eq!(stmt.columns, 4);
        assert_eq!(
            stmt.params,
            vec![
                SqlValue::Integer(5),
                SqlValue::Integer(1000),
                SqlValue::Real(3.2),
                SqlValue::Null
            ]
        );
    }

    #[test]
    fn insert_of_only_invalid_rows_is_noop() {
        let rows = vec![json!({"val": 3.2}), json!("not an object")];
        assert!(build_insert(TableKind::Records, &rows).is_none());
    }

    #[test]
    fn insert_renders_timestamp_conversion_expression() {
        let rows = vec![json!({"name": "recipe", "ts": 1000, "payload": {"head": {}}})];
        let stmt =
            build_insert(TableKind::Custom, &rows).unwrap_or_else(|| panic!("expected statement"));
        assert!(stmt.sql.contains("datetime(? / 1000, 'unixepoch')"), "{}", stmt.sql);
        assert_eq!(stmt.params[1], SqlValue::Integer(1000));
        assert_eq!(stmt.params[3], SqlValue::Text("{\"head\":{}}".to_string()));
    }

    #[test]
    fn select_raw_sql_passes_through_verbatim() {
        let filter = ReadFilter {
            sql: Some("select 1".to_string()),
            ..ReadFilter::default()
        };
        let stmt = build_select(&filter).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(stmt.sql, "select 1");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn select_multi_id_filter_is_or_joined_and_ordered() {
        let filter = ReadFilter {
            ids: Some("1,2".to_string()),
            start: Some(1000),
            end: Some(2000),
            notnull: Some(json!(true)),
            ..ReadFilter::default()
        };
        let stmt = build_select(&filter).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(
            stmt.sql,
            "SELECT * FROM records WHERE (\"id\" = ? OR \"id\" = ?) AND \"ts\" >= ? \
             AND \"ts\" <= ? AND \"val\" IS NOT NULL ORDER BY \"ts\" ASC"
        );
        assert_eq!(
            stmt.params,
            vec![
                SqlValue::Integer(1),
                SqlValue::Integer(2),
                SqlValue::Integer(1000),
                SqlValue::Integer(2000)
            ]
        );
    }

    #[test]
    fn select_single_id_is_not_parenthesized() {
        let filter = ReadFilter {
            ids: Some("7".to_string()),
            ..ReadFilter::default()
        };
        let stmt = build_select(&filter).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(stmt.sql, "SELECT * FROM records WHERE \"id\" = ? ORDER BY \"ts\" ASC");
    }

    #[test]
    fn select_timeline_bounds_use_start_and_end_columns() {
        let filter = ReadFilter {
            dn_prop: Some("DT101.value,DT102".to_string()),
            start: Some(10),
            end: Some(20),
            ..ReadFilter::default()
        };
        let stmt = build_select(&filter).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(
            stmt.sql,
            "SELECT * FROM timeline WHERE ((\"dn\" = ? AND \"prop\" = ?) OR \"dn\" = ?) \
             AND \"end\" >= ? AND \"start\" <= ? ORDER BY \"start\" ASC"
        );
    }

    #[test]
    fn select_ignores_notnull_for_tables_without_a_value_column() {
        let filter = ReadFilter {
            dn_prop: Some("DT101.value".to_string()),
            notnull: Some(json!(1)),
            ..ReadFilter::default()
        };
        let stmt = build_select(&filter).unwrap_or_else(|err| panic!("{err}"));
        assert!(!stmt.sql.contains("IS NOT NULL"), "{}", stmt.sql);
    }

    #[test]
    fn select_without_identifiers_is_a_validation_error() {
        let result = build_select(&ReadFilter::default());
        assert!(matches!(result, Err(AgentError::Validation(_))));
    }

    #[test]
    fn select_rejects_non_numeric_ids() {
        let filter = ReadFilter {
            ids: Some("1,x".to_string()),
            ..ReadFilter::default()
        };
        assert!(matches!(build_select(&filter), Err(AgentError::Validation(_))));
    }

    #[test]
    fn json_patch_renders_nested_and_indexed_paths() {
        let stmt = build_json_patch(TableKind::Custom, 3, "head.Weight", &json!("80"), false)
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(
            stmt.sql,
            "UPDATE customtable SET \"payload\" = json_set(\"payload\", '$.head.Weight', ?) \
             WHERE \"id\" = ?"
        );
        assert_eq!(stmt.params, vec![SqlValue::Text("80".to_string()), SqlValue::Integer(3)]);

        let indexed =
            build_json_patch(TableKind::Custom, 3, "rows.OpType[3]", &json!("7"), true)
                .unwrap_or_else(|err| panic!("{err}"));
        assert!(indexed.sql.contains("'$.rows.OpType[3]'"), "{}", indexed.sql);
        assert_eq!(indexed.params[0], SqlValue::Real(7.0));
    }

    #[test]
    fn json_patch_rejects_malformed_paths() {
        for path in ["", "head..x", "head.We ight", "rows.OpType[x]", "rows.OpType[3"] {
            let result = build_json_patch(TableKind::Custom, 1, path, &json!(1), false);
            assert!(matches!(result, Err(AgentError::Validation(_))), "path {path}");
        }
    }

    #[test]
    fn delete_chunk_combines_keys_and_cutoff() {
        let chunk = vec![
            RetentionKey::Id(9),
            RetentionKey::DnProp {
                dn: "DT101".to_string(),
                prop: "value".to_string(),
            },
        ];
        let stmt = build_delete_chunk(TableKind::Records, &chunk, 123)
            .unwrap_or_else(|| panic!("expected statement"));
        assert_eq!(
            stmt.sql,
            "DELETE FROM records WHERE (\"id\" = ? OR (\"dn\" = ? AND \"prop\" = ?)) \
             AND \"ts\" < ?"
        );
        assert_eq!(stmt.params.last(), Some(&SqlValue::Integer(123)));
    }

    #[test]
    fn delete_chunk_of_nothing_is_noop() {
        assert!(build_delete_chunk(TableKind::Records, &[], 123).is_none());
        assert!(build_delete_by_ids(TableKind::Custom, &[]).is_none());
    }

    #[test]
    fn delete_by_level_targets_level_and_age() {
        let stmt = build_delete_by_level(TableKind::PluginLog, 2, 500);
        assert_eq!(stmt.sql, "DELETE FROM pluginlog WHERE \"level\" = ? AND \"ts\" < ?");
        assert_eq!(stmt.params, vec![SqlValue::Integer(2), SqlValue::Integer(500)]);
    }
}
