// crates/historian-agent/src/overflow.rs
// ============================================================================
// Module: Overflow Controller
// Description: Periodic size polling and overflow flag maintenance.
// Purpose: Keep the shared overflow flag current and report size telemetry.
// Dependencies: historian-core, tracing
// ============================================================================

//! ## Overview
//! Each sweep measures the on-disk store size, compares it against the
//! configured limit, and flips the shared overflow flag. The flag gates the
//! write path; this controller itself never blocks or rejects anything. A
//! procinfo message carrying the size, the flag, and per-log-table row
//! counts goes out whenever the measurement changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use historian_core::SharedState;
use historian_core::StorageGateway;
use historian_core::TableKind;
use historian_core::envelope::OutboundMessage;
use historian_core::envelope::ProcInfo;
use tracing::debug;
use tracing::warn;

use crate::channel::Channel;

// ============================================================================
// SECTION: Overflow Controller
// ============================================================================

/// Bytes per megabyte, for the size comparison.
const BYTES_PER_MB: f64 = 1_048_576.0;

/// Polls store size and maintains the overflow flag.
pub struct OverflowController {
    /// Store capability.
    gateway: Arc<dyn StorageGateway>,
    /// Shared flag read by the write path.
    state: Arc<SharedState>,
    /// Outbound envelope queue.
    channel: Channel,
    /// Configured store limit in megabytes.
    limit_mb: f64,
    /// Size observed on the previous sweep, in megabytes.
    last_size_mb: f64,
}

impl OverflowController {
    /// Builds the controller over shared agent state.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        state: Arc<SharedState>,
        channel: Channel,
        limit_mb: f64,
    ) -> Self {
        Self {
            gateway,
            state,
            channel,
            limit_mb,
            last_size_mb: -1.0,
        }
    }

    /// Runs one poll sweep: measure, flip the flag, report on change.
    ///
    /// # Edge Cases
    /// - A failed size probe leaves the flag untouched; the next sweep
    ///   retries.
    pub fn sweep(&mut self) {
        let bytes = match self.gateway.database_size_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "size probe failed");
                return;
            }
        };
        #[allow(clippy::cast_precision_loss, reason = "Store sizes stay far below 2^52 bytes.")]
        let size_mb = (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0;
        let overflow = size_mb >= self.limit_mb;
        let flag_changed = self.state.set_overflow(overflow);
        let size_changed = (size_mb - self.last_size_mb).abs() > f64::EPSILON;
        if flag_changed {
            warn!(size_mb, limit_mb = self.limit_mb, overflow, "overflow flag changed");
        } else {
            debug!(size_mb, overflow, "size sweep");
        }
        if flag_changed || size_changed {
            self.last_size_mb = size_mb;
            self.channel.send(OutboundMessage::procinfo(ProcInfo {
                size: Some(size_mb),
                overflow: Some(u8::from(overflow)),
                tables: self.log_table_counts(),
                ..ProcInfo::default()
            }));
        }
    }

    /// Samples per-log-table row counts for the telemetry payload.
    fn log_table_counts(&self) -> std::collections::BTreeMap<String, u64> {
        let mut counts = std::collections::BTreeMap::new();
        for kind in TableKind::LOGS {
            let table = kind.schema().table;
            match self.gateway.row_count(table) {
                Ok(count) => {
                    counts.insert(table.to_string(), count);
                }
                Err(err) => {
                    warn!(table, error = %err, "row count probe failed");
                }
            }
        }
        counts
    }
}
