// crates/historian-store/src/schema.rs
// ============================================================================
// Module: Schema Manager
// Description: Idempotent schema provisioning for every table kind.
// Purpose: Create tables and indexes at startup; fail fatally on error.
// Dependencies: historian-core
// ============================================================================

//! ## Overview
//! Each registered table kind carries a fixed, versionless DDL. Provisioning
//! issues `CREATE TABLE IF NOT EXISTS` plus the supporting indexes: a
//! time-column index for series tables and a `tsid` index for log tables.
//! A failure here terminates startup; there is no migration machinery.

// ============================================================================
// SECTION: Imports
// ============================================================================

use historian_core::GatewayError;
use historian_core::Statement;
use historian_core::StorageGateway;
use historian_core::TableKind;

// ============================================================================
// SECTION: Provisioning
// ============================================================================

/// Provisions every registered table kind through the gateway.
///
/// # Errors
///
/// Returns [`GatewayError`] from the first failing DDL statement; callers
/// treat this as fatal.
pub fn provision_schema(gateway: &dyn StorageGateway) -> Result<(), GatewayError> {
    for kind in TableKind::ALL {
        let schema = kind.schema();
        gateway.run(&Statement::raw(schema.create_ddl()))?;
        for index_sql in index_ddl(kind) {
            gateway.run(&Statement::raw(index_sql))?;
        }
    }
    Ok(())
}

/// Returns the supporting index statements for a table kind.
fn index_ddl(kind: TableKind) -> Vec<String> {
    let schema = kind.schema();
    let mut statements = Vec::new();
    match kind {
        TableKind::Records | TableKind::StrRecords | TableKind::Timeline => {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {table}_{column} ON {table} (\"{column}\")",
                table = schema.table,
                column = schema.time_column,
            ));
        }
        _ if schema.is_log => {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {table}_tsid ON {table} (\"tsid\")",
                table = schema.table,
            ));
        }
        _ => {}
    }
    statements
}
