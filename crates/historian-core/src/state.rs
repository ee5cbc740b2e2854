// crates/historian-core/src/state.rs
// ============================================================================
// Module: Shared Agent State
// Description: Overflow flag and latency high-water marks.
// Purpose: Explicit shared state object instead of implicit globals.
// Dependencies: std atomics
// ============================================================================

//! ## Overview
//! The overflow controller is the single writer of the overflow flag; the
//! write path is its single reader. The check is a plain flag test, not a
//! lock-guarded critical section — the flag only gates a soft limit, so a
//! narrow race between check and rejection is acceptable. Latency marks are
//! monotonic maxima; callers emit telemetry only when a mark moves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// Process-wide mutable state shared between the overflow controller, the
/// write path, and the read path.
///
/// # Invariants
/// - `overflow` is recomputed only by a fresh size poll; it is never
///   cleared externally mid-process.
/// - The backpressure error fires only on the 0→1 edge; `reported` latches
///   until the flag clears.
#[derive(Debug, Default)]
pub struct SharedState {
    /// Current overflow flag.
    overflow: AtomicBool,
    /// Whether the current rising edge was already reported to a writer.
    reported: AtomicBool,
    /// Maximum observed write latency in milliseconds.
    max_write_ms: AtomicU64,
    /// Batch size at the write latency high-water mark.
    max_write_count: AtomicU64,
    /// Maximum observed read latency in milliseconds.
    max_read_ms: AtomicU64,
    /// Row count at the read latency high-water mark.
    max_read_count: AtomicU64,
}

impl SharedState {
    /// Creates a fresh state with the overflow flag down.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current overflow flag.
    #[must_use]
    pub fn overflow(&self) -> bool {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Applies a freshly polled overflow flag; returns true when the flag
    /// changed. Clearing the flag re-arms the one-shot report.
    pub fn set_overflow(&self, flag: bool) -> bool {
        let previous = self.overflow.swap(flag, Ordering::Relaxed);
        if previous && !flag {
            self.reported.store(false, Ordering::Relaxed);
        }
        previous != flag
    }

    /// Claims the single backpressure report for the current rising edge.
    /// Returns true for exactly one caller per edge.
    pub fn claim_overflow_report(&self) -> bool {
        self.reported
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Records a write observation; returns the new high-water pair when
    /// the mark moved.
    pub fn record_write(&self, elapsed_ms: u64, batch_size: u64) -> Option<(u64, u64)> {
        Self::advance(&self.max_write_ms, &self.max_write_count, elapsed_ms, batch_size)
    }

    /// Records a read observation; returns the new high-water pair when the
    /// mark moved.
    pub fn record_read(&self, elapsed_ms: u64, row_count: u64) -> Option<(u64, u64)> {
        Self::advance(&self.max_read_ms, &self.max_read_count, elapsed_ms, row_count)
    }

    /// Advances a latency mark monotonically.
    fn advance(
        mark: &AtomicU64,
        companion: &AtomicU64,
        elapsed_ms: u64,
        count: u64,
    ) -> Option<(u64, u64)> {
        let mut current = mark.load(Ordering::Relaxed);
        while elapsed_ms > current {
            match mark.compare_exchange(current, elapsed_ms, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => {
                    companion.store(count, Ordering::Relaxed);
                    return Some((elapsed_ms, count));
                }
                Err(observed) => current = observed,
            }
        }
        None
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_edge_is_reported_exactly_once() {
        let state = SharedState::new();
        assert!(state.set_overflow(true));
        assert!(state.claim_overflow_report());
        assert!(!state.claim_overflow_report());
        // Sustained 1→1 polls do not re-arm the report.
        assert!(!state.set_overflow(true));
        assert!(!state.claim_overflow_report());
        // Clearing re-arms for the next rising edge.
        assert!(state.set_overflow(false));
        assert!(state.set_overflow(true));
        assert!(state.claim_overflow_report());
    }

    #[test]
    fn latency_marks_are_monotonic() {
        let state = SharedState::new();
        assert_eq!(state.record_write(10, 3), Some((10, 3)));
        assert_eq!(state.record_write(5, 100), None);
        assert_eq!(state.record_write(20, 7), Some((20, 7)));
        assert_eq!(state.record_read(1, 1), Some((1, 1)));
    }
}
