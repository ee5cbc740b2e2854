// crates/historian-agent/src/config.rs
// ============================================================================
// Module: Agent Config
// Description: Agent configuration loading and validation.
// Purpose: Accept a config file path or inline JSON from the launcher.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The parent process passes either a path to a JSON config file or the
//! configuration itself as a JSON string. The payload may nest the agent's
//! section under a `dbagent` key; a flat object works too. All intervals
//! and limits are validated before the agent starts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration argument supplied.
    #[error("no options in command line")]
    Missing,
    /// Config file could not be read.
    #[error("config file not found or unreadable: {0}")]
    Unreadable(String),
    /// Config payload could not be parsed.
    #[error("config parse failure: {0}")]
    Parse(String),
    /// A validated field was out of range.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Agent configuration.
///
/// # Invariants
/// - `db_limit_mb` is the soft aggregate size limit gating writes.
/// - Intervals are in seconds and must be greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Path to the database file.
    pub dbfile: PathBuf,
    /// Soft size limit in megabytes.
    #[serde(default = "default_db_limit_mb")]
    pub db_limit_mb: f64,
    /// Size-poll interval in seconds.
    #[serde(default = "default_size_poll_interval_secs")]
    pub size_poll_interval_secs: u64,
    /// Settings solicitation interval in seconds.
    #[serde(default = "default_settings_interval_secs")]
    pub settings_interval_secs: u64,
    /// Per-log-table row ceiling for the safety deletion.
    #[serde(default = "default_max_log_records")]
    pub max_log_records: u64,
    /// Store busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Read connection pool size.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

/// Returns the default soft size limit in megabytes.
const fn default_db_limit_mb() -> f64 {
    1_024.0
}

/// Returns the default size-poll interval.
const fn default_size_poll_interval_secs() -> u64 {
    60
}

/// Returns the default settings solicitation interval.
const fn default_settings_interval_secs() -> u64 {
    3_600
}

/// Returns the default per-log-table row ceiling.
const fn default_max_log_records() -> u64 {
    100_000
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Returns the default read pool size.
const fn default_read_pool_size() -> usize {
    4
}

impl AgentConfig {
    /// Loads configuration from a file path or an inline JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the argument is absent, unreadable,
    /// unparseable, or fails validation.
    pub fn load(argument: Option<&str>) -> Result<Self, ConfigError> {
        let argument = argument.ok_or(ConfigError::Missing)?;
        let raw = if argument.ends_with(".json") {
            std::fs::read_to_string(Path::new(argument))
                .map_err(|err| ConfigError::Unreadable(format!("{argument}: {err}")))?
        } else {
            argument.to_string()
        };
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        // The launcher may wrap the agent section under its process name.
        let section = value.get("dbagent").cloned().unwrap_or(value);
        let config: Self =
            serde_json::from_value(section).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a field is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_limit_mb <= 0.0 {
            return Err(ConfigError::Invalid("db_limit_mb must be greater than zero".to_string()));
        }
        if self.size_poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "size_poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.settings_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "settings_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.read_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "read_pool_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_json_with_section_loads() {
        let config = AgentConfig::load(Some(r#"{"dbagent": {"dbfile": "/tmp/h.db"}}"#))
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(config.dbfile, PathBuf::from("/tmp/h.db"));
        assert!((config.db_limit_mb - 1_024.0).abs() < f64::EPSILON);
        assert_eq!(config.max_log_records, 100_000);
    }

    #[test]
    fn flat_inline_json_loads() {
        let config = AgentConfig::load(Some(r#"{"dbfile": "/tmp/h.db", "db_limit_mb": 2.5}"#))
            .unwrap_or_else(|err| panic!("{err}"));
        assert!((config.db_limit_mb - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_argument_is_rejected() {
        assert!(matches!(AgentConfig::load(None), Err(ConfigError::Missing)));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let result = AgentConfig::load(Some(r#"{"dbfile": "/tmp/h.db", "db_limit_mb": 0}"#));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
