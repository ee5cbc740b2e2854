// crates/historian-core/src/policy.rs
// ============================================================================
// Module: Retention Policy
// Description: Retention policy payloads and age-bucket constants.
// Purpose: Shape the settings push consumed once per retention cycle.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A retention policy arrives with a `settings` envelope and is consumed by
//! exactly one cycle; it is never persisted. Data policies map identifiers
//! to an age in days; log policies map severity levels to an age per named
//! log table. Buckets are evaluated independently per configured age — the
//! policy itself guarantees an identifier appears in at most one bucket.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Supported retention age buckets in days, ascending.
pub const AGE_BUCKETS_DAYS: [u32; 11] = [1, 7, 15, 30, 90, 180, 360, 366, 500, 732, 1098];

/// Upper bound on identifiers per delete statement; bounds statement size
/// and transaction scope.
pub const DELETE_CHUNK_MAX: usize = 500;

/// Milliseconds per day.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Computes the deletion cutoff for an age bucket.
#[must_use]
pub const fn cutoff_ms(now_ms: i64, age_days: u32) -> i64 {
    now_ms - (age_days as i64) * MS_PER_DAY
}

// ============================================================================
// SECTION: Policy Types
// ============================================================================

/// Row-owning key targeted by a retention entry.
///
/// # Invariants
/// - `Id` targets id-keyed series tables; `DnProp` targets name-keyed ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionKey {
    /// Series id.
    Id(i64),
    /// Device name and property pair.
    DnProp {
        /// Device name.
        dn: String,
        /// Property name.
        prop: String,
    },
}

/// One data retention entry: an identifier and its declared age.
///
/// # Invariants
/// - Either `id` or `dn` is present; entries with neither carry no key and
///   are skipped by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionEntry {
    /// Series id for id-keyed tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Device name for name-keyed tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dn: Option<String>,
    /// Property name, paired with `dn`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop: Option<String>,
    /// Declared age in days.
    pub days: u32,
}

impl RetentionEntry {
    /// Returns the row-owning key for the entry, if it carries one.
    #[must_use]
    pub fn key(&self) -> Option<RetentionKey> {
        if let Some(id) = self.id {
            return Some(RetentionKey::Id(id));
        }
        self.dn.as_ref().map(|dn| RetentionKey::DnProp {
            dn: dn.clone(),
            prop: self.prop.clone().unwrap_or_default(),
        })
    }
}

/// One log retention entry: a severity level and its declared age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRetentionEntry {
    /// Severity level matched by equality.
    pub level: i64,
    /// Declared age in days.
    pub days: u32,
}

/// The `rp` member of a settings payload: either a data identifier list or
/// a per-log-table map of level entries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PolicyScope {
    /// Point/string data policy.
    Data(Vec<RetentionEntry>),
    /// Log-category policy keyed by log table name.
    Logs(BTreeMap<String, Vec<LogRetentionEntry>>),
}

/// Retention settings payload delivered with a `settings` envelope.
///
/// # Invariants
/// - `rp` applies to point records (or log tables in the log form);
///   `rpstr` applies to the string-record table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SettingsPayload {
    /// Primary retention policy.
    pub rp: PolicyScope,
    /// Optional string-record retention policy.
    #[serde(default)]
    pub rpstr: Option<Vec<RetentionEntry>>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn buckets_are_ascending_and_unique() {
        for window in AGE_BUCKETS_DAYS.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn cutoff_subtracts_whole_days() {
        assert_eq!(cutoff_ms(1_000_000_000, 7), 1_000_000_000 - 7 * 86_400_000);
    }

    #[test]
    fn data_policy_parses() {
        let payload: SettingsPayload =
            serde_json::from_value(json!({"rp": [{"id": 9, "days": 7}]}))
                .unwrap_or_else(|err| panic!("{err}"));
        let PolicyScope::Data(entries) = payload.rp else {
            panic!("expected data scope");
        };
        assert_eq!(entries[0].key(), Some(RetentionKey::Id(9)));
        assert_eq!(entries[0].days, 7);
    }

    #[test]
    fn log_policy_parses() {
        let payload: SettingsPayload = serde_json::from_value(
            json!({"rp": {"pluginlog": [{"level": 2, "days": 15}]}}),
        )
        .unwrap_or_else(|err| panic!("{err}"));
        let PolicyScope::Logs(map) = payload.rp else {
            panic!("expected log scope");
        };
        assert_eq!(map["pluginlog"][0].days, 15);
    }

    #[test]
    fn entry_without_key_is_skippable() {
        let entry = RetentionEntry {
            id: None,
            dn: None,
            prop: None,
            days: 7,
        };
        assert!(entry.key().is_none());
    }
}
