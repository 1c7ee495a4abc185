//! Extraction service facade

use crate::{RetryPolicies, ServiceError};
use chrono::{DateTime, Utc};
use quarry_domain::traits::{AuditSink, DocumentCatalog, InsightStore, OpsStore};
use quarry_domain::{
    AuditEvent, AuditKind, BreakerRegistry, BreakerStatus, CaseId, DocumentId, DocumentVersion,
    ExtractionJob, ExtractionResult, InsightSnapshot, JobCounts, JobFamily, JobStatus, QuarryError,
};
use quarry_reconciler::Reconciler;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Subject of kill-switch audit events
const KILL_SWITCH_SUBJECT: &str = "extraction";

/// Everything the service needs from a store
pub trait ServiceStore: InsightStore + OpsStore + DocumentCatalog + AuditSink {}

impl<T> ServiceStore for T where T: InsightStore + OpsStore + DocumentCatalog + AuditSink {}

/// Enqueue, status and administrative operations over a shared store
///
/// The store handle and breaker registry are the same ones the worker uses, so
/// an open extraction breaker refuses new work here too.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use quarry_domain::{BreakerRegistry, CaseId, DocumentId, JobStatus};
/// use quarry_service::{ExtractionService, RetryPolicies};
/// use quarry_store::SqliteStore;
/// use std::sync::{Arc, Mutex};
///
/// let store = Arc::new(Mutex::new(SqliteStore::new(":memory:").unwrap()));
/// let service = ExtractionService::new(store, BreakerRegistry::default(), RetryPolicies::default()).unwrap();
///
/// let job = service
///     .enqueue(&DocumentId::from("doc-1"), &CaseId::from("case-1"), Utc::now())
///     .unwrap();
/// assert_eq!(job.status, JobStatus::Queued);
/// ```
pub struct ExtractionService<S> {
    store: Arc<Mutex<S>>,
    breakers: BreakerRegistry,
    policies: RetryPolicies,
    reconciler: Arc<Reconciler>,
}

impl<S: ServiceStore> ExtractionService<S> {
    /// Create a service with the default reconciler
    pub fn new(
        store: Arc<Mutex<S>>,
        breakers: BreakerRegistry,
        policies: RetryPolicies,
    ) -> Result<Self, ServiceError> {
        policies.validate().map_err(ServiceError::Config)?;
        Ok(Self {
            store,
            breakers,
            policies,
            reconciler: Arc::new(Reconciler::default()),
        })
    }

    /// Use a specific reconciler (e.g. one shared with the worker)
    pub fn with_reconciler(mut self, reconciler: Arc<Reconciler>) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Shared store handle
    pub fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }

    /// Breaker registry
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Retry policies
    pub fn policies(&self) -> &RetryPolicies {
        &self.policies
    }

    /// Reconciler in use
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    fn lock(&self) -> MutexGuard<'_, S> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Refuse with `CircuitOpen` while the family's breaker is cooling down
    fn gate(&self, family: JobFamily) -> Result<(), ServiceError> {
        let breaker = self.breakers.get(family.as_str());
        match breaker.retry_after_at(Instant::now()) {
            Some(retry_after) => {
                debug!(family = %family, ?retry_after, "Breaker refused new work");
                Err(QuarryError::CircuitOpen {
                    name: breaker.name().to_string(),
                    retry_after,
                }
                .into())
            }
            None => Ok(()),
        }
    }

    fn existing_job(&self, document_id: &DocumentId) -> Result<ExtractionJob, ServiceError> {
        self.lock()
            .job_for_document(document_id)
            .map_err(ServiceError::store)?
            .ok_or_else(|| QuarryError::NotFound(format!("No job for document {}", document_id)).into())
    }

    /// Create the extraction job of a document (idempotent)
    ///
    /// An existing job is returned unchanged even while the breaker is open;
    /// only the creation of new work is refused.
    pub fn enqueue(
        &self,
        document_id: &DocumentId,
        case_id: &CaseId,
        now: DateTime<Utc>,
    ) -> Result<ExtractionJob, ServiceError> {
        if document_id.as_str().trim().is_empty() || case_id.as_str().trim().is_empty() {
            return Err(QuarryError::Validation("document_id and case_id are required".to_string()).into());
        }

        if let Some(existing) = self.lock().job_for_document(document_id).map_err(ServiceError::store)? {
            return Ok(existing);
        }

        self.gate(JobFamily::Extraction)?;

        let job = self
            .lock()
            .create_job(document_id, case_id, self.policies.extraction.max_attempts, now)
            .map_err(ServiceError::store)?;
        info!(job_id = %job.id, document_id = %document_id, case_id = %case_id, "Extraction enqueued");
        Ok(job)
    }

    /// Register a new document version and make sure it gets extracted
    ///
    /// The first version is enqueued. A later version re-queues the existing job
    /// with a fresh budget, unless a worker currently holds it. While the
    /// extraction breaker is open the document is still registered and the
    /// `CircuitOpen` refusal is returned; [`retry`](Self::retry) enqueues it later.
    pub fn ingest_document(
        &self,
        document: DocumentVersion,
        now: DateTime<Utc>,
    ) -> Result<(DocumentVersion, ExtractionJob), ServiceError> {
        if document.file_name.trim().is_empty() {
            return Err(QuarryError::Validation(format!("Document {} has no file name", document.document_id)).into());
        }
        if document.content_ref.trim().is_empty() {
            return Err(
                QuarryError::Validation(format!("Document {} has no content reference", document.document_id)).into(),
            );
        }

        let stored = self
            .lock()
            .register_document(document, now)
            .map_err(ServiceError::store)?;
        debug!(document_id = %stored.document_id, version = stored.version, "Document registered");

        let job = self.enqueue(&stored.document_id, &stored.case_id, now)?;
        if stored.version == 1 || job.status == JobStatus::Queued {
            return Ok((stored, job));
        }

        let reset = self.lock().reset_job(job.id, now).map_err(ServiceError::store);
        match reset {
            Ok(job) => {
                info!(job_id = %job.id, version = stored.version, "New document version re-queued");
                Ok((stored, job))
            }
            Err(ServiceError::Quarry(QuarryError::Validation(reason))) => {
                warn!(job_id = %job.id, %reason, "New document version left to the running job");
                Ok((stored, job))
            }
            Err(e) => Err(e),
        }
    }

    /// Job of a document, if any
    pub fn job_status(&self, document_id: &DocumentId) -> Result<Option<ExtractionJob>, ServiceError> {
        self.lock().job_for_document(document_id).map_err(ServiceError::store)
    }

    /// Latest extraction result of a document, if any
    pub fn result(&self, document_id: &DocumentId) -> Result<Option<ExtractionResult>, ServiceError> {
        self.lock().result(document_id).map_err(ServiceError::store)
    }

    /// Jobs, optionally of one status, most recently updated first
    pub fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<ExtractionJob>, ServiceError> {
        self.lock().list_jobs(status, limit).map_err(ServiceError::store)
    }

    /// Per-status job totals
    pub fn job_counts(&self) -> Result<JobCounts, ServiceError> {
        self.lock().job_counts().map_err(ServiceError::store)
    }

    /// Persisted snapshot of a case, or a freshly computed one if none exists yet
    ///
    /// A computed snapshot is not persisted and emits no audit events.
    pub fn insight_snapshot(&self, case_id: &CaseId, now: DateTime<Utc>) -> Result<InsightSnapshot, ServiceError> {
        let store = self.lock();
        if let Some(snapshot) = store.latest_snapshot(case_id).map_err(ServiceError::store)? {
            return Ok(snapshot);
        }
        Ok(self.reconciler.compute(case_id, &*store, now)?)
    }

    /// Recompute, persist and signal a case's snapshot now
    pub fn reconcile(&self, case_id: &CaseId, now: DateTime<Utc>) -> Result<InsightSnapshot, ServiceError> {
        let mut store = self.lock();
        Ok(self.reconciler.reconcile(case_id, &mut *store, now)?)
    }

    /// Administrative retry: reset the job with a fresh budget, or enqueue it if absent
    ///
    /// Gated by the extraction breaker. Refused with `Validation` while a worker
    /// holds a live lock on the job.
    pub fn retry(&self, document_id: &DocumentId, now: DateTime<Utc>) -> Result<ExtractionJob, ServiceError> {
        self.gate(JobFamily::Extraction)?;

        let existing = self.lock().job_for_document(document_id).map_err(ServiceError::store)?;
        let Some(previous) = existing else {
            let document = self
                .lock()
                .current_version(document_id)
                .map_err(ServiceError::store)?
                .ok_or_else(|| QuarryError::NotFound(format!("Document {}", document_id)))?;
            return self.enqueue(document_id, &document.case_id, now);
        };

        let mut store = self.lock();
        let job = store.reset_job(previous.id, now).map_err(ServiceError::store)?;
        store.record(AuditEvent::new(
            AuditKind::JobReset,
            document_id.to_string(),
            json!({
                "job_id": job.id.to_string(),
                "action": "retry",
                "previous_status": previous.status.as_str(),
                "previous_attempts": previous.attempt_count,
            }),
            now,
        ));
        info!(job_id = %job.id, document_id = %document_id, previous_status = %previous.status, "Job reset");
        Ok(job)
    }

    /// Retry a `failed` or `queued` job now, keeping its attempt count
    ///
    /// Unlike [`retry`](Self::retry) this respects the retry policy: it fails
    /// with `RetryExhausted` once the budget is used up and with
    /// `RetryBackoffNotElapsed` while the backoff is still running.
    pub fn resume(&self, document_id: &DocumentId, now: DateTime<Utc>) -> Result<ExtractionJob, ServiceError> {
        let job = self.existing_job(document_id)?;
        self.policies
            .extraction
            .assert_retry_allowed(job.attempt_count, job.max_attempts, job.last_attempt_at, now)?;
        self.gate(JobFamily::Extraction)?;

        let mut store = self.lock();
        let resumed = store.make_eligible(job.id, now).map_err(ServiceError::store)?;
        store.record(AuditEvent::new(
            AuditKind::JobReset,
            document_id.to_string(),
            json!({
                "job_id": resumed.id.to_string(),
                "action": "resume",
                "previous_status": job.status.as_str(),
                "previous_attempts": job.attempt_count,
            }),
            now,
        ));
        info!(job_id = %resumed.id, attempts = resumed.attempt_count, "Job resumed");
        Ok(resumed)
    }

    /// Whether a job of `family` may be retried now
    ///
    /// Checks the family's breaker, then its retry policy. Returns the backoff
    /// that applied.
    pub fn check_family_retry(
        &self,
        family: JobFamily,
        attempt_count: u32,
        max_attempts: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Duration, ServiceError> {
        self.gate(family)?;
        Ok(self
            .policies
            .get(family)
            .assert_retry_allowed(attempt_count, max_attempts, last_attempt_at, now)?)
    }

    /// Whether the extraction kill switch is engaged
    pub fn kill_switch_state(&self) -> Result<bool, ServiceError> {
        self.lock().extraction_disabled().map_err(ServiceError::store)
    }

    /// Engage (`true`) or release the extraction kill switch; returns the previous state
    pub fn set_kill_switch(&self, engaged: bool, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        let mut store = self.lock();
        let previous = store.extraction_disabled().map_err(ServiceError::store)?;
        store
            .set_extraction_disabled(engaged, now)
            .map_err(ServiceError::store)?;
        store.record(AuditEvent::new(
            AuditKind::KillSwitchChanged,
            KILL_SWITCH_SUBJECT,
            json!({ "disabled": engaged, "previous": previous }),
            now,
        ));
        if engaged {
            warn!("Extraction kill switch engaged");
        } else {
            info!("Extraction kill switch released");
        }
        Ok(previous)
    }

    /// State of every breaker created so far
    pub fn breaker_states(&self) -> Vec<BreakerStatus> {
        self.breakers.snapshot()
    }

    /// Force a breaker closed; false if no breaker has that name
    pub fn reset_breaker(&self, name: &str) -> bool {
        let reset = self.breakers.reset(name);
        if reset {
            info!(breaker = name, "Breaker reset");
        }
        reset
    }
}
