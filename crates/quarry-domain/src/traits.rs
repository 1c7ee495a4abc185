//! Trait definitions for external interactions
//!
//! These traits define the boundaries between domain logic and infrastructure.
//! Infrastructure implementations live in other crates.
//!
//! The store traits are synchronous and take `&mut self` for writes; async callers
//! share a store as `Arc<Mutex<S>>` and never hold the lock across an `.await`.
//! [`InsightStore`], [`OpsStore`] and [`DocumentCatalog`] extend [`JobStore`] so
//! one backend exposes a single error type.

use crate::{
    AuditEvent, CaseId, DocumentId, DocumentVersion, ExtractionJob, ExtractionOutput,
    ExtractionRequest, ExtractionResult, FailureUpdate, FieldObservation, InsightSnapshot,
    JobCounts, JobId, JobStatus, ProviderError, QuarryError, StorageError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Trait for persisting extraction jobs and their results
///
/// Implemented by the infrastructure layer (quarry-store)
pub trait JobStore {
    /// Error type for store operations
    type Error: std::error::Error + Into<QuarryError> + Send + Sync + 'static;

    /// Age after which a lock is considered abandoned
    fn lock_timeout(&self) -> chrono::Duration;

    /// Create the job for a document, or return the existing one unchanged
    fn create_job(
        &mut self,
        document_id: &DocumentId,
        case_id: &CaseId,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<ExtractionJob, Self::Error>;

    /// Atomically claim up to `limit` eligible jobs for `worker_id`
    ///
    /// Eligible: `queued`/`failed` with `next_attempt_at <= now`, or `processing`
    /// with an expired lock. Oldest `next_attempt_at` first. Concurrent claimers
    /// never receive the same job.
    fn claim_jobs(
        &mut self,
        limit: usize,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExtractionJob>, Self::Error>;

    /// Clear lock fields on jobs whose lock has expired; status is untouched
    fn release_expired_locks(&mut self, now: DateTime<Utc>) -> Result<usize, Self::Error>;

    /// Persist a successful run in one transaction
    ///
    /// Upserts the result, appends the observations and moves the job to
    /// `succeeded` with locks, `next_attempt_at` and `last_error` cleared.
    /// `job` is the snapshot returned by the claim: nothing is written unless
    /// the job is still `processing` under that same claim (`locked_by` and
    /// `locked_at`), otherwise the call fails with a lost-lease error.
    fn mark_success(
        &mut self,
        job: &ExtractionJob,
        result: &ExtractionResult,
        observations: &[FieldObservation],
        now: DateTime<Utc>,
    ) -> Result<(), Self::Error>;

    /// Write failure bookkeeping and clear the lock
    ///
    /// Applied only while the claim recorded in `update` is still held; a
    /// reclaimed or finished job is left untouched and the call fails with a
    /// lost-lease error.
    fn mark_failure(&mut self, update: &FailureUpdate) -> Result<(), Self::Error>;

    /// Return a job to `queued` with a fresh attempt budget
    ///
    /// Refused while a live lock is held.
    fn reset_job(&mut self, job_id: JobId, now: DateTime<Utc>) -> Result<ExtractionJob, Self::Error>;

    /// Make a `failed` or `queued` job eligible now, keeping its attempt count
    fn make_eligible(&mut self, job_id: JobId, now: DateTime<Utc>) -> Result<ExtractionJob, Self::Error>;

    /// Get a job by id
    fn job(&self, id: JobId) -> Result<Option<ExtractionJob>, Self::Error>;

    /// Get the job of a document
    fn job_for_document(&self, document_id: &DocumentId) -> Result<Option<ExtractionJob>, Self::Error>;

    /// List jobs, optionally filtered by status, most recently updated first
    fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<ExtractionJob>, Self::Error>;

    /// Per-status totals
    fn job_counts(&self) -> Result<JobCounts, Self::Error>;

    /// Latest extraction result of a document
    fn result(&self, document_id: &DocumentId) -> Result<Option<ExtractionResult>, Self::Error>;
}

/// Trait for reading observations and persisting case snapshots
pub trait InsightStore: JobStore {
    /// Every observation recorded for a case
    fn observations_for_case(&self, case_id: &CaseId) -> Result<Vec<FieldObservation>, Self::Error>;

    /// Last persisted snapshot of a case
    fn latest_snapshot(&self, case_id: &CaseId) -> Result<Option<InsightSnapshot>, Self::Error>;

    /// Persist a snapshot, replacing the previous one
    fn save_snapshot(&mut self, snapshot: &InsightSnapshot) -> Result<(), Self::Error>;
}

/// Trait for operational flags
pub trait OpsStore: JobStore {
    /// Whether the extraction kill switch is engaged
    fn extraction_disabled(&self) -> Result<bool, Self::Error>;

    /// Engage or release the extraction kill switch
    fn set_extraction_disabled(&mut self, disabled: bool, now: DateTime<Utc>) -> Result<(), Self::Error>;
}

/// Trait for the document metadata the worker needs
pub trait DocumentCatalog: JobStore {
    /// Register a new version of a document
    ///
    /// The catalog assigns `version`; the value passed in is ignored.
    fn register_document(
        &mut self,
        document: DocumentVersion,
        now: DateTime<Utc>,
    ) -> Result<DocumentVersion, Self::Error>;

    /// Current (highest) version of a document
    fn current_version(&self, document_id: &DocumentId) -> Result<Option<DocumentVersion>, Self::Error>;
}

/// Best-effort audit recording
///
/// Implementations log their own failures instead of returning them.
pub trait AuditSink {
    /// Record one event
    fn record(&mut self, event: AuditEvent);
}

/// Trait for turning document bytes into text and structured fields
///
/// Implemented by quarry-provider
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Provider name recorded on results
    fn name(&self) -> &str;

    /// Extract text and structured fields from a document
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionOutput, ProviderError>;
}

/// Trait for fetching stored document bytes
#[async_trait]
pub trait ContentStorage: Send + Sync {
    /// Fetch the bytes behind a content reference
    ///
    /// Disallowed references are rejected before any I/O.
    async fn get_bytes(&self, content_ref: &str) -> Result<Vec<u8>, StorageError>;
}
