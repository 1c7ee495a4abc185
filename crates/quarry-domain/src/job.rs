//! Extraction job model and lifecycle

use crate::{CaseId, DocumentId, JobId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an extraction job
///
/// ```text
/// queued ──claim──► processing ──success──► succeeded
///   ▲                  │
///   │                  ├──failure (attempts left)──► failed ──claim──► processing
///   │                  └──failure (exhausted)──────► canceled
///   └──────── reset (any state without a live lock) ◄──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its first claim
    Queued,
    /// Owned by a worker
    Processing,
    /// Extraction finished (terminal)
    Succeeded,
    /// Last attempt failed; eligible again at `next_attempt_at`
    Failed,
    /// Attempt budget exhausted (terminal)
    Canceled,
}

impl JobStatus {
    /// All statuses in lifecycle order
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Succeeded,
        JobStatus::Failed,
        JobStatus::Canceled,
    ];

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    /// Parse a status from its storage representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            "canceled" => Some(JobStatus::Canceled),
            _ => None,
        }
    }

    /// Whether no further automatic transition will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Canceled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(&s.to_lowercase()).ok_or_else(|| format!("Invalid job status: {}", s))
    }
}

/// One unit of extraction work, tracked per document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionJob {
    /// Unique identifier
    pub id: JobId,

    /// Document being extracted (at most one job per document)
    pub document_id: DocumentId,

    /// Case the document belongs to
    pub case_id: CaseId,

    /// Current lifecycle status
    pub status: JobStatus,

    /// Number of failed attempts so far
    pub attempt_count: u32,

    /// Attempt budget
    pub max_attempts: u32,

    /// When the job becomes eligible for claim (None once terminal)
    pub next_attempt_at: Option<DateTime<Utc>>,

    /// When the current lock was taken
    pub locked_at: Option<DateTime<Utc>>,

    /// Worker holding the current lock
    pub locked_by: Option<String>,

    /// Message of the most recent failure
    pub last_error: Option<String>,

    /// When the job was last claimed
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl ExtractionJob {
    /// Create a fresh job in `queued` state, eligible immediately
    pub fn new(document_id: DocumentId, case_id: CaseId, max_attempts: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            document_id,
            case_id,
            status: JobStatus::Queued,
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            next_attempt_at: Some(now),
            locked_at: None,
            locked_by: None,
            last_error: None,
            last_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the lock is older than `lock_timeout` (or absent)
    pub fn lock_expired(&self, lock_timeout: Duration, now: DateTime<Utc>) -> bool {
        match self.locked_at {
            Some(locked_at) => now - locked_at > lock_timeout,
            None => true,
        }
    }

    /// Whether a worker currently holds a live lock on this job
    pub fn is_locked(&self, lock_timeout: Duration, now: DateTime<Utc>) -> bool {
        self.locked_at.is_some() && !self.lock_expired(lock_timeout, now)
    }

    /// Whether a claim at `now` may pick this job up
    pub fn is_claimable(&self, lock_timeout: Duration, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Queued | JobStatus::Failed => {
                self.next_attempt_at.is_some_and(|at| at <= now)
            }
            JobStatus::Processing => self.lock_expired(lock_timeout, now),
            JobStatus::Succeeded | JobStatus::Canceled => false,
        }
    }

    /// Attempts left before the job is canceled
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt_count)
    }
}

/// Field values written by `mark_failure`
///
/// Carries the claim it was built from; the store only applies it while that
/// claim is still held.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureUpdate {
    /// Job being updated
    pub job_id: JobId,

    /// Worker that claimed the job
    pub locked_by: Option<String>,

    /// Claim time of the lock being released
    pub locked_at: Option<DateTime<Utc>>,

    /// Attempt count to write
    pub attempt_count: u32,

    /// `Failed` if attempts remain, `Canceled` if exhausted (`Queued` when deferred)
    pub status: JobStatus,

    /// Failure message
    pub last_error: String,

    /// Next eligibility time (None when canceled)
    pub next_attempt_at: Option<DateTime<Utc>>,

    /// Attempt budget (administrative override point)
    pub max_attempts: u32,

    /// Time of the update
    pub updated_at: DateTime<Utc>,
}

impl FailureUpdate {
    /// Build the bookkeeping for one more failed attempt of `job`
    ///
    /// `delay` is the backoff to apply when attempts remain.
    pub fn after_failure(
        job: &ExtractionJob,
        error: impl Into<String>,
        delay: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let attempt_count = job.attempt_count.saturating_add(1);
        let exhausted = attempt_count >= job.max_attempts;
        let next_attempt_at = if exhausted {
            None
        } else {
            let delay = Duration::from_std(delay).unwrap_or(Duration::MAX);
            Some(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC))
        };

        Self {
            job_id: job.id,
            locked_by: job.locked_by.clone(),
            locked_at: job.locked_at,
            attempt_count,
            status: if exhausted { JobStatus::Canceled } else { JobStatus::Failed },
            last_error: error.into(),
            next_attempt_at,
            max_attempts: job.max_attempts,
            updated_at: now,
        }
    }

    /// Hand a claimed job back without spending an attempt
    ///
    /// Used when the job could not be started at all (e.g. its breaker refused
    /// the call). A job that never ran goes back to `queued`.
    pub fn deferred(job: &ExtractionJob, reason: impl Into<String>, until: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id,
            locked_by: job.locked_by.clone(),
            locked_at: job.locked_at,
            attempt_count: job.attempt_count,
            status: if job.attempt_count == 0 { JobStatus::Queued } else { JobStatus::Failed },
            last_error: reason.into(),
            next_attempt_at: Some(until),
            max_attempts: job.max_attempts,
            updated_at: now,
        }
    }
}

/// Per-status job totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    /// Jobs waiting for the first claim
    pub queued: usize,
    /// Jobs owned by a worker
    pub processing: usize,
    /// Finished jobs
    pub succeeded: usize,
    /// Jobs waiting for a retry
    pub failed: usize,
    /// Jobs that exhausted their budget
    pub canceled: usize,
}

impl JobCounts {
    /// Add one job of the given status
    pub fn record(&mut self, status: JobStatus, count: usize) {
        match status {
            JobStatus::Queued => self.queued += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Succeeded => self.succeeded += count,
            JobStatus::Failed => self.failed += count,
            JobStatus::Canceled => self.canceled += count,
        }
    }

    /// Total jobs across statuses
    pub fn total(&self) -> usize {
        self.queued + self.processing + self.succeeded + self.failed + self.canceled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(now: DateTime<Utc>) -> ExtractionJob {
        ExtractionJob::new(DocumentId::from("doc"), CaseId::from("case"), 3, now)
    }

    #[test]
    fn test_status_round_trip() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("done"), None);
        assert_eq!("FAILED".parse::<JobStatus>().unwrap(), JobStatus::Failed);
    }

    #[test]
    fn test_new_job_is_claimable_now() {
        let now = Utc::now();
        let job = job(now);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.is_claimable(Duration::minutes(10), now));
        assert!(!job.is_claimable(Duration::minutes(10), now - Duration::seconds(1)));
    }

    #[test]
    fn test_max_attempts_at_least_one() {
        let job = ExtractionJob::new(DocumentId::from("d"), CaseId::from("c"), 0, Utc::now());
        assert_eq!(job.max_attempts, 1);
    }

    #[test]
    fn test_processing_claimable_only_after_lock_expiry() {
        let now = Utc::now();
        let mut job = job(now);
        job.status = JobStatus::Processing;
        job.locked_at = Some(now - Duration::minutes(5));
        job.locked_by = Some("w1".to_string());

        assert!(!job.is_claimable(Duration::minutes(10), now));
        assert!(job.is_locked(Duration::minutes(10), now));
        assert!(job.is_claimable(Duration::minutes(4), now));
    }

    #[test]
    fn test_failure_update_schedules_retry() {
        let now = Utc::now();
        let job = job(now);
        let update = FailureUpdate::after_failure(&job, "boom", std::time::Duration::from_secs(30), now);

        assert_eq!(update.attempt_count, 1);
        assert_eq!(update.status, JobStatus::Failed);
        assert_eq!(update.next_attempt_at, Some(now + Duration::seconds(30)));
    }

    #[test]
    fn test_failure_update_carries_claim() {
        let now = Utc::now();
        let mut claimed = job(now);
        claimed.status = JobStatus::Processing;
        claimed.locked_by = Some("w1".to_string());
        claimed.locked_at = Some(now);

        let update = FailureUpdate::after_failure(&claimed, "boom", std::time::Duration::from_secs(30), now);
        assert_eq!(update.locked_by.as_deref(), Some("w1"));
        assert_eq!(update.locked_at, Some(now));
    }

    #[test]
    fn test_failure_update_cancels_when_exhausted() {
        let now = Utc::now();
        let mut job = job(now);
        job.attempt_count = 2;
        let update = FailureUpdate::after_failure(&job, "boom", std::time::Duration::from_secs(30), now);

        assert_eq!(update.attempt_count, 3);
        assert_eq!(update.status, JobStatus::Canceled);
        assert_eq!(update.next_attempt_at, None);
    }

    #[test]
    fn test_deferred_keeps_attempts() {
        let now = Utc::now();
        let mut job = job(now);
        let until = now + Duration::seconds(30);

        let update = FailureUpdate::deferred(&job, "circuit open", until, now);
        assert_eq!(update.attempt_count, 0);
        assert_eq!(update.status, JobStatus::Queued);
        assert_eq!(update.next_attempt_at, Some(until));

        job.attempt_count = 1;
        let update = FailureUpdate::deferred(&job, "circuit open", until, now);
        assert_eq!(update.attempt_count, 1);
        assert_eq!(update.status, JobStatus::Failed);
    }

    #[test]
    fn test_job_counts() {
        let mut counts = JobCounts::default();
        counts.record(JobStatus::Queued, 2);
        counts.record(JobStatus::Canceled, 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.queued, 2);
    }
}
