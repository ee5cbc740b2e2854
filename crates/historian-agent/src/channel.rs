// crates/historian-agent/src/channel.rs
// ============================================================================
// Module: Outbound Channel
// Description: Fan-in sender for outbound envelopes.
// Purpose: Let every handler emit responses without owning the writer.
// Dependencies: historian-core, tokio, tracing
// ============================================================================

//! ## Overview
//! Handlers push [`OutboundMessage`] values into an unbounded queue; a
//! single writer task serializes them as one JSON object per line. Send
//! failures mean the peer is gone — they are logged and otherwise ignored,
//! matching the fire-and-forget contract of the channel.

// ============================================================================
// SECTION: Imports
// ============================================================================

use historian_core::AgentError;
use historian_core::OutboundMessage;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

// ============================================================================
// SECTION: Channel
// ============================================================================

/// Cloneable outbound side of the IPC channel.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Queue into the single writer task.
    sender: UnboundedSender<OutboundMessage>,
}

impl Channel {
    /// Wraps the writer-task sender.
    #[must_use]
    pub const fn new(sender: UnboundedSender<OutboundMessage>) -> Self {
        Self { sender }
    }

    /// Sends an outbound message; a closed peer is logged and dropped.
    pub fn send(&self, message: OutboundMessage) {
        if self.sender.send(message).is_err() {
            warn!("channel closed, outbound message dropped");
        }
    }

    /// Sends an error envelope for the given request id.
    pub fn send_error(&self, id: &str, error: &AgentError) {
        warn!(id, %error, "command failed");
        self.send(OutboundMessage::error(id.to_string(), error.short_message()));
    }
}
