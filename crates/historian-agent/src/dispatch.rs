// crates/historian-agent/src/dispatch.rs
// ============================================================================
// Module: Command Dispatcher
// Description: Routes inbound envelopes to their handlers.
// Purpose: One entry point per envelope; every failure becomes an error
//          envelope correlated by request id.
// Dependencies: historian-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! The dispatcher owns the per-command handlers and translates an inbound
//! envelope into exactly one handler call. Handlers are synchronous; the
//! binary runs each dispatch on the blocking pool so slow statements never
//! stall the channel reader. Malformed envelopes are answered with an error
//! envelope when an id is available and logged otherwise.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use historian_core::AgentError;
use historian_core::CommandType;
use historian_core::RequestEnvelope;
use historian_core::StorageGateway;
use historian_core::TableKind;
use historian_core::UpdateQuery;
use historian_core::build_delete_all;
use historian_core::build_delete_by_ids;
use historian_core::build_json_patch;
use historian_core::Statement;
use historian_core::envelope::OutboundMessage;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::channel::Channel;
use crate::read::ReadPath;
use crate::retention::RetentionEngine;
use crate::unix_millis;
use crate::write::WritePath;

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Routes each inbound envelope to its handler.
pub struct Dispatcher {
    /// Store capability for the simple statement commands.
    gateway: Arc<dyn StorageGateway>,
    /// Outbound envelope queue.
    channel: Channel,
    /// Batched insert handler.
    write_path: WritePath,
    /// Filtered select handler.
    read_path: ReadPath,
    /// Settings-driven retention handler.
    retention: RetentionEngine,
}

impl Dispatcher {
    /// Builds the dispatcher over the shared handlers.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        channel: Channel,
        write_path: WritePath,
        read_path: ReadPath,
        retention: RetentionEngine,
    ) -> Self {
        Self {
            gateway,
            channel,
            write_path,
            read_path,
            retention,
        }
    }

    /// Handles one inbound envelope end to end.
    pub fn dispatch(&self, envelope: &RequestEnvelope) {
        let id = envelope.id.clone().unwrap_or_default();
        debug!(id, command = ?envelope.command, "dispatching");
        match envelope.command {
            CommandType::Write => self.handle_write(&id, envelope),
            CommandType::Read => self.handle_read(&id, envelope),
            CommandType::Update => self.handle_update(&id, envelope),
            CommandType::Remove => self.handle_remove(&id, envelope),
            CommandType::RemoveAll => self.handle_remove_all(&id, envelope),
            CommandType::Run => self.handle_run(&id, envelope),
            CommandType::Settings => self.handle_settings(envelope),
        }
    }

    /// `write`: batch insert into the named table (default point records).
    fn handle_write(&self, id: &str, envelope: &RequestEnvelope) {
        let Some(kind) = self.resolve_table(id, envelope, TableKind::Records) else {
            return;
        };
        let Some(Value::Array(rows)) = &envelope.payload else {
            self.channel
                .send_error(id, &AgentError::Validation("write payload must be an array".to_string()));
            return;
        };
        self.write_path.write(id, rows, kind);
    }

    /// `read`: filtered or raw select.
    fn handle_read(&self, id: &str, envelope: &RequestEnvelope) {
        let Some(query) = &envelope.query else {
            self.channel
                .send_error(id, &AgentError::Validation("read requires a query".to_string()));
            return;
        };
        self.read_path.read(id, query);
    }

    /// `update`: JSON-path partial update of one custom record.
    fn handle_update(&self, id: &str, envelope: &RequestEnvelope) {
        let Some(query) = &envelope.query else {
            self.channel
                .send_error(id, &AgentError::Validation("update requires a query".to_string()));
            return;
        };
        let spec: UpdateQuery = match serde_json::from_value(query.clone()) {
            Ok(spec) => spec,
            Err(err) => {
                self.channel.send_error(id, &AgentError::Validation(err.to_string()));
                return;
            }
        };
        let kind = match spec.table.as_deref().map(TableKind::from_table_name) {
            None => TableKind::Custom,
            Some(Some(kind)) => kind,
            Some(None) => {
                self.unknown_table(id, spec.table.as_deref().unwrap_or_default());
                return;
            }
        };
        let stmt = match build_json_patch(kind, spec.id, &spec.field, &spec.value, spec.numeric) {
            Ok(stmt) => stmt,
            Err(err) => {
                self.channel.send_error(id, &err);
                return;
            }
        };
        self.run_and_respond(id, &stmt);
    }

    /// `remove`: delete custom records by id list.
    fn handle_remove(&self, id: &str, envelope: &RequestEnvelope) {
        let Some(kind) = self.resolve_table(id, envelope, TableKind::Custom) else {
            return;
        };
        let ids: Vec<i64> = match &envelope.payload {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_i64).collect(),
            _ => {
                self.channel.send_error(
                    id,
                    &AgentError::Validation("remove payload must be an id array".to_string()),
                );
                return;
            }
        };
        let Some(stmt) = build_delete_by_ids(kind, &ids) else {
            debug!(id, "remove id list empty, skipping");
            self.channel
                .send(OutboundMessage::result(id.to_string(), None, json!(0)));
            return;
        };
        self.run_and_respond(id, &stmt);
    }

    /// `removeall`: delete every row of the named table.
    fn handle_remove_all(&self, id: &str, envelope: &RequestEnvelope) {
        let Some(kind) = self.resolve_table(id, envelope, TableKind::Custom) else {
            return;
        };
        self.run_and_respond(id, &build_delete_all(kind));
    }

    /// `run`: raw statement where only the affected count matters.
    fn handle_run(&self, id: &str, envelope: &RequestEnvelope) {
        let sql = envelope
            .query
            .as_ref()
            .and_then(|query| query.get("sql"))
            .and_then(Value::as_str);
        let Some(sql) = sql else {
            self.channel
                .send_error(id, &AgentError::Validation("run requires query.sql".to_string()));
            return;
        };
        self.run_and_respond(id, &Statement::raw(sql.to_string()));
    }

    /// `settings`: consume one retention policy push.
    fn handle_settings(&self, envelope: &RequestEnvelope) {
        let Some(payload) = &envelope.payload else {
            warn!("settings envelope without payload, ignoring");
            return;
        };
        self.retention.apply(payload, unix_millis());
    }

    /// Runs a statement and answers with the affected-row count.
    fn run_and_respond(&self, id: &str, stmt: &Statement) {
        match self.gateway.run(stmt) {
            Ok(affected) => {
                debug!(id, affected, "statement executed");
                self.channel
                    .send(OutboundMessage::result(id.to_string(), None, json!(affected)));
            }
            Err(err) => self.channel.send_error(id, &AgentError::from(err)),
        }
    }

    /// Resolves the envelope's table name, falling back to a default kind.
    fn resolve_table(
        &self,
        id: &str,
        envelope: &RequestEnvelope,
        default: TableKind,
    ) -> Option<TableKind> {
        match envelope.table.as_deref() {
            None => Some(default),
            Some(name) => match TableKind::from_table_name(name) {
                Some(kind) => Some(kind),
                None => {
                    self.unknown_table(id, name);
                    None
                }
            },
        }
    }

    /// Reports an unknown table name.
    fn unknown_table(&self, id: &str, name: &str) {
        self.channel
            .send_error(id, &AgentError::Validation(format!("unknown table: {name}")));
    }
}
