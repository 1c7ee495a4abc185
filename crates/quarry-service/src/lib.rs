//! Quarry Service
//!
//! The facade other systems call: enqueue documents for extraction, read job
//! status, results and case snapshots, and run the administrative operations
//! (retry, resume, kill switch, breakers).
//!
//! # Gating
//!
//! New work and administrative retries are refused with
//! [`QuarryError::CircuitOpen`](quarry_domain::QuarryError::CircuitOpen) while the
//! extraction breaker is open and cooling down. Secondary job families (analysis,
//! summary) run elsewhere but share the same gate through
//! [`ExtractionService::check_family_retry`].
//!
//! # Configuration
//!
//! ```toml
//! [retry.extraction]
//! base_delay_ms = 30000
//! max_attempts = 5
//!
//! [retry.analysis]
//! base_delay_ms = 60000
//! max_attempts = 3
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod service;

pub use config::RetryPolicies;
pub use error::ServiceError;
pub use service::{ExtractionService, ServiceStore};
