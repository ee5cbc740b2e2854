// crates/historian-agent/src/lib.rs
// ============================================================================
// Module: Historian Agent
// Description: Long-running historian worker over an IPC channel.
// Purpose: Dispatch command envelopes, run retention and overflow control.
// Dependencies: historian-core, historian-store, tokio, tracing
// ============================================================================

//! ## Overview
//! The agent reads JSON command envelopes from its channel, translates them
//! into store queries, and writes correlated responses back. Commands are
//! handled concurrently: responses carry the originating request id and
//! arrive in no particular order. Two independent timers drive the
//! retention solicitation and the size poll; neither excludes in-flight
//! commands — the store's own concurrency control is the only arbiter.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod overflow;
pub mod read;
pub mod retention;
pub mod write;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use channel::Channel;
pub use config::AgentConfig;
pub use dispatch::Dispatcher;
pub use overflow::OverflowController;
pub use read::ReadPath;
pub use retention::RetentionEngine;
pub use write::WritePath;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Returns the current time in unix epoch milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    use std::time::SystemTime;
    use std::time::UNIX_EPOCH;

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
