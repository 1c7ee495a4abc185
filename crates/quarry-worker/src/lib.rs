//! Quarry Worker
//!
//! The poller that drives extraction jobs from `queued` to a terminal state.
//!
//! # Overview
//!
//! The worker is responsible for:
//! - **Claiming**: atomically taking eligible jobs, reclaiming abandoned locks
//! - **Extraction**: fetching document bytes and calling the provider under a
//!   bounded timeout
//! - **Bookkeeping**: persisting results, or scheduling retries with exponential
//!   backoff until the attempt budget is spent
//! - **Isolation**: a circuit breaker per job family, and a kill switch read
//!   fresh every tick
//! - **Reconciliation**: recomputing the case snapshot after each success
//!
//! # Configuration Presets
//!
//! ```
//! use quarry_worker::WorkerConfig;
//!
//! let config = WorkerConfig::default();
//! let config = WorkerConfig::aggressive();
//! let config = WorkerConfig::lenient();
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [worker]
//! poll_interval_ms = 5000
//! concurrency = 4
//! provider_timeout_ms = 120000
//! reconcile = true
//!
//! [worker.retry]
//! base_delay_ms = 30000
//! max_delay_ms = 3600000
//! max_attempts = 5
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod metrics;
mod processor;
mod worker;

pub use config::WorkerConfig;
pub use error::WorkerError;
pub use metrics::WorkerMetrics;
pub use worker::{ExtractionWorker, TickReport, TickStatus, WorkerStore};
