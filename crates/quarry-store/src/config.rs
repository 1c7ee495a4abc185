//! Store configuration

use crate::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_LOCK_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for opening a [`SqliteStore`](crate::SqliteStore)
///
/// # Examples
///
/// ```
/// use quarry_store::StoreConfig;
///
/// let config = StoreConfig::default();
/// assert_eq!(config.lock_timeout_secs, 600);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file (`:memory:` for a throwaway database)
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Age after which a job lock is considered abandoned (in seconds)
    /// Default: 600 (10 minutes)
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// How long a connection waits for the write lock (in milliseconds)
    /// Default: 5000
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_path() -> PathBuf {
    PathBuf::from("quarry.db")
}

fn default_lock_timeout_secs() -> u64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// Get lock timeout as Duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Get busy timeout as Duration
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.lock_timeout_secs == 0 {
            return Err("lock_timeout_secs must be greater than 0".to_string());
        }
        if self.path.as_os_str().is_empty() {
            return Err("path cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.lock_timeout(), Duration::from_secs(600));
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"path": "/tmp/q.db"}"#).unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/q.db"));
        assert_eq!(config.lock_timeout_secs, DEFAULT_LOCK_TIMEOUT_SECS);
    }

    #[test]
    fn test_invalid_config() {
        let config = StoreConfig {
            lock_timeout_secs: 0,
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
