//! Configuration management for the CLI.
//!
//! One TOML file configures every component:
//!
//! ```toml
//! [store]
//! path = "quarry.db"
//! lock_timeout_secs = 600
//!
//! [storage]
//! root = "/srv/quarry/documents"
//!
//! [provider]
//! kind = "ollama"
//! model = "llama3.2-vision"
//!
//! [worker]
//! poll_interval_ms = 5000
//! concurrency = 4
//! provider_timeout_ms = 120000
//!
//! [retry.extraction]
//! base_delay_ms = 30000
//! max_attempts = 5
//!
//! [breaker]
//! failure_threshold = 5
//! cooldown_ms = 30000
//!
//! [reconciler]
//! abs_tolerance = 1.0
//! rel_tolerance = 0.01
//! ```
//!
//! The extraction retry policy lives in `[retry.extraction]`; the worker takes
//! its backoff from there.

use crate::error::{CliError, Result};
use quarry_domain::{BreakerConfig, RetryPolicy};
use quarry_provider::ProviderConfig;
use quarry_reconciler::ReconcilerConfig;
use quarry_service::RetryPolicies;
use quarry_store::StoreConfig;
use quarry_worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Full Quarry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarryConfig {
    /// Job database
    #[serde(default)]
    pub store: StoreConfig,

    /// Where document bytes are read from
    #[serde(default)]
    pub storage: StorageConfig,

    /// Extraction provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Poller settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Per-family retry policies
    #[serde(default)]
    pub retry: RetryPolicies,

    /// Breaker tuning shared by every job family
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Field reconciliation tolerances
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputSettings,
}

/// Content storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory relative content references resolve against
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,

    /// Default output format
    #[serde(default = "default_format")]
    pub format: OutputFormat,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format
    Table,
    /// JSON format
    Json,
    /// Quiet (minimal) format
    Quiet,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            color: true,
            format: OutputFormat::Table,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_format() -> OutputFormat {
    OutputFormat::Table
}

impl QuarryConfig {
    /// Default configuration file path (`~/.quarry/config.toml`).
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| CliError::Config("Could not find home directory".into()))?;
        Ok(home.join(".quarry").join("config.toml"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    /// Load the explicit file if given, else the default file, else defaults.
    ///
    /// An explicit path that does not exist is an error; a missing default file
    /// is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let path = Self::default_path()?;
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Worker configuration with the extraction retry policy applied
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            retry: self.retry.extraction,
            ..self.worker.clone()
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        let section = |name: &str, result: std::result::Result<(), String>| {
            result.map_err(|e| CliError::Config(format!("[{}] {}", name, e)))
        };

        section("store", self.store.validate())?;
        section("provider", self.provider.validate())?;
        section("worker", self.worker_config().validate())?;
        section("retry", self.retry.validate())?;
        section("breaker", self.breaker.validate())?;
        section("reconciler", self.reconciler.validate())?;

        // A claim must outlive the provider call it covers
        let provider_timeout = self.worker.provider_timeout();
        let lock_timeout = self.store.lock_timeout();
        if provider_timeout >= lock_timeout {
            return Err(CliError::Config(format!(
                "[worker] provider_timeout_ms ({} ms) must be less than [store] lock_timeout_secs ({} s)",
                provider_timeout.as_millis(),
                lock_timeout.as_secs()
            )));
        }

        if self.worker.retry != RetryPolicy::default() && self.worker.retry != self.retry.extraction {
            return Err(CliError::Config(
                "[worker.retry] is not used; set the extraction policy in [retry.extraction]".to_string(),
            ));
        }
        Ok(())
    }
}
