// crates/historian-core/src/error.rs
// ============================================================================
// Module: Agent Error Taxonomy
// Description: Error classes shared across the historian agent.
// Purpose: Classify failures so the dispatcher can envelope or escalate.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every per-command failure is caught at the handler boundary and converted
//! into an error envelope tagged with the original request id. Only two
//! classes are fatal: the initial connection and schema provisioning. No
//! automatic retry exists anywhere in the core; callers may resend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::gateway::GatewayError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Agent-level error taxonomy.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages are short and safe to forward to the IPC peer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Store or pool unreachable. Fatal at startup, reported at runtime.
    #[error("connection failure: {0}")]
    Connection(String),
    /// Malformed filter or missing required field. Rejected before any
    /// store access.
    #[error("validation failure: {0}")]
    Validation(String),
    /// Store rejected the statement. Reported per request id, not retried.
    #[error("query failure: {0}")]
    Query(String),
    /// Database space limit reached. Surfaced once per rising edge.
    #[error("the allocated space for the database has run out, increase the limit")]
    Overflow,
    /// Retention chunk failed. Logged and skipped, cycle continues.
    #[error("retention failure: {0}")]
    Retention(String),
}

impl AgentError {
    /// Returns the short message placed in an error envelope.
    #[must_use]
    pub fn short_message(&self) -> String {
        // Envelope peers display a single line; keep the first line only.
        let text = self.to_string();
        text.lines().next().unwrap_or_default().to_string()
    }
}

impl From<GatewayError> for AgentError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Connection(message) => Self::Connection(message),
            GatewayError::Query(message) | GatewayError::Decode(message) => Self::Query(message),
        }
    }
}
