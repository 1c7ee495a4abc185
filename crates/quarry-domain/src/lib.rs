//! Quarry Domain Layer
//!
//! Core types, policies and collaborator traits for the document extraction
//! reliability core. Everything that carries engineering risk but no I/O lives
//! here: the job lifecycle, the retry policy shared by every job family, the
//! circuit breaker, the field/observation model and the error taxonomy.
//!
//! ## Key Concepts
//!
//! - **Job**: one unit of extraction work per document, claimed under a lock
//! - **Retry policy**: exponential backoff with a ceiling and an attempt budget
//! - **Breaker**: named failure-isolation state machine gating a job family
//! - **Observation**: one raw field value extracted from one document
//! - **Snapshot**: the reconciled case-level view of all observations
//!
//! ## Architecture
//!
//! Infrastructure (SQLite, HTTP providers, the poller) lives in other crates and
//! plugs in through the traits in [`traits`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod breaker;
pub mod error;
pub mod extraction;
pub mod field;
pub mod ids;
pub mod job;
pub mod retry;
pub mod snapshot;
pub mod traits;

// Re-exports for convenience
pub use audit::{AuditEvent, AuditKind, MemoryAuditSink};
pub use breaker::{BreakerConfig, BreakerRegistry, BreakerState, BreakerStatus, CircuitBreaker};
pub use error::{FailureKind, JobFailure, ProviderError, QuarryError, StorageError};
pub use extraction::{DocumentVersion, ExtractionOutput, ExtractionRequest, ExtractionResult};
pub use field::{AppliesTo, FieldDefinition, FieldKind, FieldObservation};
pub use ids::{CaseId, DocumentId, JobId};
pub use job::{ExtractionJob, FailureUpdate, JobCounts, JobStatus};
pub use retry::{JobFamily, RetryPolicy};
pub use snapshot::{FieldAnalysis, FieldSource, InsightSnapshot, ResolvedField};
