// crates/historian-agent/src/write.rs
// ============================================================================
// Module: Write Path
// Description: Batched inserts with overflow gating and latency tracking.
// Purpose: Turn write envelopes into multi-row inserts; success is silent.
// Dependencies: historian-core, tracing
// ============================================================================

//! ## Overview
//! Writes are side-effect only: the peer hears back on failure, never on
//! success. The overflow flag is tested before every attempt; exactly one
//! backpressure error is emitted per rising edge, after which writes are
//! silently dropped until retention frees enough space for a fresh poll to
//! clear the flag. Sub-batches are not transactional by design.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use historian_core::AgentError;
use historian_core::SharedState;
use historian_core::StorageGateway;
use historian_core::TableKind;
use historian_core::build_insert;
use historian_core::envelope::OutboundMessage;
use historian_core::envelope::ProcInfo;
use serde_json::Value;
use tracing::debug;

use crate::channel::Channel;

// ============================================================================
// SECTION: Write Path
// ============================================================================

/// Batched insert handler.
#[derive(Clone)]
pub struct WritePath {
    /// Store capability.
    gateway: Arc<dyn StorageGateway>,
    /// Overflow flag and latency marks.
    state: Arc<SharedState>,
    /// Outbound envelope queue.
    channel: Channel,
}

impl WritePath {
    /// Builds the write path over shared agent state.
    #[must_use]
    pub fn new(gateway: Arc<dyn StorageGateway>, state: Arc<SharedState>, channel: Channel) -> Self {
        Self {
            gateway,
            state,
            channel,
        }
    }

    /// Handles one write envelope. Success is silent; failures and the
    /// one-shot backpressure signal are error envelopes.
    pub fn write(&self, id: &str, payload: &[Value], kind: TableKind) {
        if !kind.schema().is_log && self.state.overflow() {
            if self.state.claim_overflow_report() {
                self.channel.send_error(id, &AgentError::Overflow);
            }
            return;
        }

        let Some(stmt) = build_insert(kind, payload) else {
            debug!(id, table = kind.schema().table, "write batch empty, skipping");
            return;
        };

        let started = Instant::now();
        match self.gateway.run(&stmt) {
            Ok(affected) => {
                let elapsed_ms =
                    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                debug!(id, affected, elapsed_ms, "write committed");
                let batch_size = u64::try_from(payload.len()).unwrap_or(u64::MAX);
                if let Some((mark_ms, mark_count)) = self.state.record_write(elapsed_ms, batch_size)
                {
                    self.channel.send(OutboundMessage::procinfo(ProcInfo {
                        last_max_time_write: Some(mark_ms),
                        last_max_count_write: Some(mark_count),
                        ..ProcInfo::default()
                    }));
                }
            }
            Err(err) => self.channel.send_error(id, &AgentError::from(err)),
        }
    }
}
