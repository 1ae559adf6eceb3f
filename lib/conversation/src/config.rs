//! Library configuration for conversation sessions.
//!
//! Binaries compose this into their own configuration and load it with the
//! `config` crate.

use chrono::TimeDelta;
use serde::Deserialize;

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Minutes a session may stay idle before cleanup drops it.
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i64,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

fn default_timeout_minutes() -> i64 {
    5
}

fn default_cleanup_interval_seconds() -> u64 {
    60
}

impl SessionConfig {
    /// Returns the idle timeout, saturating at the largest representable
    /// duration.
    #[must_use]
    pub fn timeout(&self) -> TimeDelta {
        TimeDelta::try_minutes(self.timeout_minutes).unwrap_or(TimeDelta::MAX)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_has_correct_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.timeout_minutes, 5);
        assert_eq!(config.cleanup_interval_seconds, 60);
        assert_eq!(config.timeout(), TimeDelta::minutes(5));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"timeout_minutes": 2}"#).expect("deserialize");
        assert_eq!(config.timeout_minutes, 2);
        assert_eq!(config.cleanup_interval_seconds, 60);
    }

    #[test]
    fn oversized_timeout_saturates() {
        let config = SessionConfig {
            timeout_minutes: 999_999_999_999_999_999,
            ..SessionConfig::default()
        };
        assert_eq!(config.timeout(), TimeDelta::MAX);
    }
}
