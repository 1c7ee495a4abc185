//! Processing of one claimed job
//!
//! Every failure is turned into job bookkeeping here; nothing a single job does
//! can fail the tick or a sibling job.

use crate::WorkerStore;
use chrono::{DateTime, Utc};
use quarry_domain::traits::{ContentStorage, ExtractionProvider};
use quarry_domain::{
    AuditEvent, AuditKind, CircuitBreaker, DocumentVersion, ExtractionJob, ExtractionOutput,
    ExtractionRequest, ExtractionResult, FailureKind, FailureUpdate, JobFailure, JobStatus,
    ProviderError, QuarryError, RetryPolicy,
};
use quarry_reconciler::Reconciler;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lock the shared store; a poisoned lock is still usable because every store
/// call is a single transaction
pub(crate) fn lock_store<S>(store: &Mutex<S>) -> MutexGuard<'_, S> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// How one job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    /// Result persisted
    Succeeded {
        /// The follow-up reconciliation failed
        reconcile_failed: bool,
    },
    /// Attempt recorded as failed (`Failed` or `Canceled`)
    Failed {
        /// Status written
        status: JobStatus,
        /// The content reference was rejected
        storage_rejected: bool,
    },
    /// Handed back without spending an attempt
    Deferred,
    /// The job was reclaimed before the outcome was written; outcome dropped
    LeaseLost,
    /// Bookkeeping could not be written; the lock will expire
    StoreError,
}

/// A provider call admitted by the breaker
///
/// Settles the breaker exactly once. Dropped unsettled (the task panicked or
/// was aborted), it records a failure, so a half-open breaker never waits on a
/// call that will not report back.
struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn acquire(breaker: &'a CircuitBreaker) -> Option<Self> {
        breaker.can_request().then(|| Self {
            breaker,
            settled: false,
        })
    }

    fn succeeded(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn failed(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(breaker = %self.breaker.name(), "Provider call abandoned, recording failure");
            self.breaker.record_failure();
        }
    }
}

/// Everything a job task needs, cheap to clone into each task
pub(crate) struct JobContext<S> {
    pub(crate) store: Arc<Mutex<S>>,
    pub(crate) provider: Arc<dyn ExtractionProvider>,
    pub(crate) storage: Arc<dyn ContentStorage>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) reconciler: Arc<Reconciler>,
    pub(crate) retry: RetryPolicy,
    pub(crate) provider_timeout: Duration,
    pub(crate) reconcile: bool,
    pub(crate) worker_id: String,
}

impl<S> Clone for JobContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            provider: Arc::clone(&self.provider),
            storage: Arc::clone(&self.storage),
            breaker: Arc::clone(&self.breaker),
            reconciler: Arc::clone(&self.reconciler),
            retry: self.retry,
            provider_timeout: self.provider_timeout,
            reconcile: self.reconcile,
            worker_id: self.worker_id.clone(),
        }
    }
}

impl<S: WorkerStore> JobContext<S> {
    /// Run one claimed job to an outcome
    pub(crate) async fn process(&self, job: ExtractionJob) -> JobOutcome {
        debug!(
            job_id = %job.id,
            document_id = %job.document_id,
            attempt = job.attempt_count + 1,
            worker_id = %self.worker_id,
            "Processing job"
        );

        let (document, mime_type) = match self.load_document(&job) {
            Ok(found) => found,
            Err(failure) => return self.fail(&job, failure, None),
        };

        let bytes = match self.storage.get_bytes(&document.content_ref).await {
            Ok(bytes) => bytes,
            Err(e) => return self.fail(&job, e.into(), Some(&document)),
        };

        let Some(permit) = BreakerPermit::acquire(&self.breaker) else {
            return self.defer(&job);
        };

        let request = ExtractionRequest {
            bytes,
            mime_type,
            file_name: document.file_name.clone(),
        };
        let extracted = match tokio::time::timeout(self.provider_timeout, self.provider.extract(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.provider_timeout)),
        };

        match extracted {
            Ok(output) => {
                permit.succeeded();
                self.complete(&job, &document, output)
            }
            Err(e) => {
                let failure = JobFailure::from(e);
                // Only availability problems count; a clean refusal proves the provider is up
                if failure.counts_against_breaker() {
                    permit.failed();
                } else {
                    permit.succeeded();
                }
                self.fail(&job, failure, Some(&document))
            }
        }
    }

    fn load_document(&self, job: &ExtractionJob) -> Result<(DocumentVersion, String), JobFailure> {
        let found = lock_store(&self.store)
            .current_version(&job.document_id)
            .map_err(|e| JobFailure::new(FailureKind::Store, format!("Failed to load document: {}", e)))?;

        let document = found.ok_or_else(|| {
            JobFailure::new(
                FailureKind::NotFound,
                format!("Document {} has no stored version", job.document_id),
            )
        })?;

        let mime_type = document
            .mime_type
            .clone()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| {
                JobFailure::new(
                    FailureKind::Validation,
                    format!("Document {} has no MIME type", job.document_id),
                )
            })?;

        Ok((document, mime_type))
    }

    fn complete(&self, job: &ExtractionJob, document: &DocumentVersion, output: ExtractionOutput) -> JobOutcome {
        let now = Utc::now();
        let structured = output.structured_json.clone().unwrap_or(Value::Null);
        let observations = self.reconciler.observations(&structured, document, now);

        let result = ExtractionResult {
            document_id: job.document_id.clone(),
            provider: output.provider,
            model: output.model,
            extracted_text: output.text,
            structured_json: output.structured_json,
            meta: json!({
                "job_id": job.id.to_string(),
                "attempt": job.attempt_count + 1,
                "document_version": document.version,
                "file_name": document.file_name,
                "category": document.category,
                "observation_count": observations.len(),
                "worker_id": self.worker_id,
            }),
            updated_at: now,
        };

        let persisted = lock_store(&self.store).mark_success(job, &result, &observations, now);
        if let Err(e) = persisted {
            let e: QuarryError = e.into();
            return match e {
                QuarryError::LeaseLost(reason) => self.lease_lost(job, &reason),
                e => {
                    let failure = JobFailure::new(FailureKind::Store, format!("Failed to persist result: {}", e));
                    self.fail(job, failure, Some(document))
                }
            };
        }

        info!(
            job_id = %job.id,
            document_id = %job.document_id,
            case_id = %job.case_id,
            observations = observations.len(),
            "Extraction succeeded"
        );

        let reconcile_failed = self.reconcile && !self.reconcile_case(job);
        JobOutcome::Succeeded { reconcile_failed }
    }

    /// Best-effort: a failure is logged and never reverts the extraction
    fn reconcile_case(&self, job: &ExtractionJob) -> bool {
        let mut store = lock_store(&self.store);
        match self.reconciler.reconcile(&job.case_id, &mut *store, Utc::now()) {
            Ok(snapshot) => {
                debug!(
                    case_id = %job.case_id,
                    missing = snapshot.missing_fields.len(),
                    conflicting = snapshot.conflicting_fields.len(),
                    "Case reconciled after extraction"
                );
                true
            }
            Err(e) => {
                warn!(job_id = %job.id, case_id = %job.case_id, error = %e, "Reconciliation failed");
                false
            }
        }
    }

    fn fail(&self, job: &ExtractionJob, failure: JobFailure, document: Option<&DocumentVersion>) -> JobOutcome {
        let now = Utc::now();
        let delay = self.retry.next_delay(job.attempt_count);
        let update = FailureUpdate::after_failure(job, failure.message.clone(), delay, now);
        let storage_rejected = failure.is_storage_rejection();

        let mut store = lock_store(&self.store);
        if storage_rejected {
            warn!(job_id = %job.id, document_id = %job.document_id, error = %failure, "Content reference rejected");
            store.record(AuditEvent::new(
                AuditKind::StorageInputRejected,
                job.document_id.to_string(),
                json!({
                    "job_id": job.id.to_string(),
                    "case_id": job.case_id.to_string(),
                    "content_ref": document.map(|d| d.content_ref.as_str()),
                    "error": failure.message,
                }),
                now,
            ));
        }

        match store.mark_failure(&update) {
            Ok(()) => {
                if update.status == JobStatus::Canceled {
                    warn!(
                        job_id = %job.id,
                        document_id = %job.document_id,
                        attempts = update.attempt_count,
                        error = %failure,
                        "Job canceled after exhausting attempts"
                    );
                } else {
                    info!(
                        job_id = %job.id,
                        document_id = %job.document_id,
                        attempts = update.attempt_count,
                        retry_in = ?delay,
                        error = %failure,
                        "Job failed, will retry"
                    );
                }
                JobOutcome::Failed {
                    status: update.status,
                    storage_rejected,
                }
            }
            Err(e) => {
                let e: QuarryError = e.into();
                match e {
                    QuarryError::LeaseLost(reason) => self.lease_lost(job, &reason),
                    e => {
                        error!(job_id = %job.id, error = %e, "Failed to record job failure");
                        JobOutcome::StoreError
                    }
                }
            }
        }
    }

    fn defer(&self, job: &ExtractionJob) -> JobOutcome {
        let now = Utc::now();
        let wait = self
            .breaker
            .retry_after_at(Instant::now())
            .unwrap_or_else(|| self.retry.base_delay());
        let until = chrono::Duration::from_std(wait)
            .ok()
            .and_then(|wait| now.checked_add_signed(wait))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let update = FailureUpdate::deferred(job, format!("Circuit '{}' is open", self.breaker.name()), until, now);

        match lock_store(&self.store).mark_failure(&update) {
            Ok(()) => {
                debug!(job_id = %job.id, until = %until, "Job deferred by breaker");
                JobOutcome::Deferred
            }
            Err(e) => {
                let e: QuarryError = e.into();
                match e {
                    QuarryError::LeaseLost(reason) => self.lease_lost(job, &reason),
                    e => {
                        error!(job_id = %job.id, error = %e, "Failed to defer job");
                        JobOutcome::StoreError
                    }
                }
            }
        }
    }

    /// Another claim owns the job now; whatever this run produced is dropped
    fn lease_lost(&self, job: &ExtractionJob, reason: &str) -> JobOutcome {
        warn!(
            job_id = %job.id,
            document_id = %job.document_id,
            worker_id = %self.worker_id,
            reason,
            "Lease lost before the outcome was written, dropping it"
        );
        JobOutcome::LeaseLost
    }
}
