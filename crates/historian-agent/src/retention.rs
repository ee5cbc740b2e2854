// crates/historian-agent/src/retention.rs
// ============================================================================
// Module: Retention Engine
// Description: Age-bucketed deletion driven by pushed settings.
// Purpose: Apply one retention cycle per settings delivery and enforce the
//          log safety cap.
// Dependencies: historian-core, tracing
// ============================================================================

//! ## Overview
//! A settings push carries the full retention policy and is consumed by one
//! cycle. Data entries are grouped by their declared age bucket and deleted
//! in bounded chunks so no single statement grows unbounded; id keys target
//! the series tables while `dn`/`prop` keys target the timeline table, the
//! only one carrying those columns. Log entries delete
//! by severity level per named log table. A failed chunk is reported and the
//! cycle continues; retention never aborts early. Independently of policy,
//! any log table over the configured row cap loses everything older than a
//! day.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use historian_core::AGE_BUCKETS_DAYS;
use historian_core::AgentError;
use historian_core::DELETE_CHUNK_MAX;
use historian_core::LogRetentionEntry;
use historian_core::MS_PER_DAY;
use historian_core::PolicyScope;
use historian_core::RetentionEntry;
use historian_core::RetentionKey;
use historian_core::SettingsPayload;
use historian_core::StorageGateway;
use historian_core::TableKind;
use historian_core::build_delete_by_level;
use historian_core::build_delete_chunk;
use historian_core::build_delete_older_than;
use historian_core::cutoff_ms;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::channel::Channel;

// ============================================================================
// SECTION: Retention Engine
// ============================================================================

/// Runs retention cycles against the store.
#[derive(Clone)]
pub struct RetentionEngine {
    /// Store capability.
    gateway: Arc<dyn StorageGateway>,
    /// Outbound envelope queue for per-chunk failure reports.
    channel: Channel,
    /// Row cap above which a log table is force-trimmed.
    max_log_records: u64,
}

impl RetentionEngine {
    /// Builds the engine over shared agent state.
    #[must_use]
    pub fn new(gateway: Arc<dyn StorageGateway>, channel: Channel, max_log_records: u64) -> Self {
        Self {
            gateway,
            channel,
            max_log_records,
        }
    }

    /// Applies one full retention cycle from a settings payload.
    ///
    /// # Edge Cases
    /// - An unparseable payload is reported once and the cycle is skipped.
    /// - Unknown log table names in the policy are ignored.
    pub fn apply(&self, payload: &Value, now_ms: i64) {
        let settings: SettingsPayload = match serde_json::from_value(payload.clone()) {
            Ok(settings) => settings,
            Err(err) => {
                self.channel
                    .send_error("settings", &AgentError::Retention(err.to_string()));
                return;
            }
        };
        match &settings.rp {
            PolicyScope::Data(entries) => {
                self.apply_data(TableKind::Records, entries, now_ms);
            }
            PolicyScope::Logs(map) => {
                for (table, entries) in map {
                    let Some(kind) = TableKind::from_table_name(table) else {
                        warn!(table, "retention policy names an unknown log table");
                        continue;
                    };
                    if !kind.schema().is_log {
                        warn!(table, "retention policy names a non-log table");
                        continue;
                    }
                    self.apply_logs(kind, entries, now_ms);
                }
            }
        }
        if let Some(entries) = &settings.rpstr {
            self.apply_data(TableKind::StrRecords, entries, now_ms);
        }
        info!("retention cycle finished");
    }

    /// Deletes expired rows for one data table, bucket by bucket.
    ///
    /// Id keys target the given table; name keys always target the timeline
    /// table, the only one keyed by `dn`/`prop`.
    fn apply_data(&self, kind: TableKind, entries: &[RetentionEntry], now_ms: i64) {
        for age_days in AGE_BUCKETS_DAYS {
            let mut id_keys: Vec<RetentionKey> = Vec::new();
            let mut name_keys: Vec<RetentionKey> = Vec::new();
            for entry in entries.iter().filter(|entry| entry.days == age_days) {
                match entry.key() {
                    Some(key @ RetentionKey::Id(_)) => id_keys.push(key),
                    Some(key @ RetentionKey::DnProp { .. }) => name_keys.push(key),
                    None => {}
                }
            }
            let cutoff = cutoff_ms(now_ms, age_days);
            self.drain_chunks(kind, &id_keys, cutoff, age_days);
            self.drain_chunks(TableKind::Timeline, &name_keys, cutoff, age_days);
        }
    }

    /// Drains one bucket's key list in bounded chunks.
    fn drain_chunks(&self, kind: TableKind, keys: &[RetentionKey], cutoff: i64, age_days: u32) {
        for chunk in keys.chunks(DELETE_CHUNK_MAX) {
            let Some(stmt) = build_delete_chunk(kind, chunk, cutoff) else {
                continue;
            };
            match self.gateway.run(&stmt) {
                Ok(affected) => {
                    debug!(
                        table = kind.schema().table,
                        age_days,
                        keys = chunk.len(),
                        affected,
                        "retention chunk deleted"
                    );
                }
                Err(err) => {
                    self.channel.send_error("delete", &AgentError::from(err));
                }
            }
        }
    }

    /// Deletes expired rows for one log table by severity level.
    fn apply_logs(&self, kind: TableKind, entries: &[LogRetentionEntry], now_ms: i64) {
        for entry in entries {
            let stmt = build_delete_by_level(kind, entry.level, cutoff_ms(now_ms, entry.days));
            match self.gateway.run(&stmt) {
                Ok(affected) => {
                    debug!(
                        table = kind.schema().table,
                        level = entry.level,
                        age_days = entry.days,
                        affected,
                        "log retention deleted"
                    );
                }
                Err(err) => {
                    self.channel.send_error("delete", &AgentError::from(err));
                }
            }
        }
    }

    /// Force-trims any log table whose row count exceeds the cap, keeping
    /// only the last day of records.
    pub fn enforce_log_cap(&self, now_ms: i64) {
        for kind in TableKind::LOGS {
            let table = kind.schema().table;
            let count = match self.gateway.row_count(table) {
                Ok(count) => count,
                Err(err) => {
                    warn!(table, error = %err, "log cap count failed");
                    continue;
                }
            };
            if count <= self.max_log_records {
                continue;
            }
            let stmt = build_delete_older_than(kind, now_ms - MS_PER_DAY);
            match self.gateway.run(&stmt) {
                Ok(affected) => {
                    warn!(table, count, affected, "log table over cap, force-trimmed");
                }
                Err(err) => {
                    self.channel.send_error("delete", &AgentError::from(err));
                }
            }
        }
    }
}
