//! Configuration for the extraction worker
//!
//! Poll cadence, batch size, provider timeout and the extraction retry policy.

use quarry_domain::{JobFamily, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the extraction worker
///
/// # Examples
///
/// ```
/// use quarry_worker::WorkerConfig;
///
/// // Default configuration (balanced)
/// let config = WorkerConfig::default();
/// assert_eq!(config.concurrency, 4);
///
/// // Aggressive polling
/// let config = WorkerConfig::aggressive();
/// assert_eq!(config.poll_interval_ms, 1_000);
///
/// // Lenient polling
/// let config = WorkerConfig::lenient();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Identity written to `locked_by` on claimed jobs
    /// Default: `worker-<pid>`
    #[serde(default = "default_worker_id")]
    pub worker_id: String,

    /// Time between ticks (in milliseconds)
    /// Default: 5 seconds
    pub poll_interval_ms: u64,

    /// Jobs claimed and processed concurrently per tick
    /// Default: 4
    pub concurrency: usize,

    /// Upper bound for one provider call (in milliseconds)
    /// Default: 120 seconds
    pub provider_timeout_ms: u64,

    /// Backoff and attempt budget for extraction jobs
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Recompute the case snapshot after each successful extraction
    /// Default: true
    #[serde(default = "default_reconcile")]
    pub reconcile: bool,
}

fn default_worker_id() -> String {
    format!("worker-{}", std::process::id())
}

fn default_reconcile() -> bool {
    true
}

impl Default for WorkerConfig {
    /// Balanced polling
    ///
    /// - Poll interval: 5 seconds
    /// - Concurrency: 4
    /// - Provider timeout: 120 seconds
    /// - Retry: 30s base, 5 attempts
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
            poll_interval_ms: 5_000,
            concurrency: 4,
            provider_timeout_ms: 120_000,
            retry: RetryPolicy::for_family(JobFamily::Extraction),
            reconcile: true,
        }
    }
}

impl WorkerConfig {
    /// Frequent polling with larger batches
    ///
    /// - Poll interval: 1 second
    /// - Concurrency: 8
    /// - Provider timeout: 60 seconds
    pub fn aggressive() -> Self {
        Self {
            poll_interval_ms: 1_000,
            concurrency: 8,
            provider_timeout_ms: 60_000,
            ..Self::default()
        }
    }

    /// Infrequent polling with small batches and patient provider calls
    ///
    /// - Poll interval: 30 seconds
    /// - Concurrency: 2
    /// - Provider timeout: 300 seconds
    pub fn lenient() -> Self {
        Self {
            poll_interval_ms: 30_000,
            concurrency: 2,
            provider_timeout_ms: 300_000,
            ..Self::default()
        }
    }

    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get provider timeout as Duration
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_id.trim().is_empty() {
            return Err("worker_id cannot be empty".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be at least 1".to_string());
        }
        if self.provider_timeout_ms == 0 {
            return Err("provider_timeout_ms must be greater than 0".to_string());
        }
        self.retry.validate().map_err(|e| format!("retry: {}", e))?;
        Ok(())
    }
}
