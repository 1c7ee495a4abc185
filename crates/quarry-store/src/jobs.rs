//! JobStore implementation

use crate::{conversion_error, from_millis, json_column, opt_from_millis, to_millis, SqliteStore, StoreError};
use chrono::{DateTime, Utc};
use quarry_domain::traits::JobStore;
use quarry_domain::{
    CaseId, DocumentId, ExtractionJob, ExtractionResult, FailureUpdate, FieldObservation, JobCounts,
    JobId, JobStatus,
};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

const JOB_COLUMNS: &str = "id, document_id, case_id, status, attempt_count, max_attempts, \
     next_attempt_at, locked_at, locked_by, last_error, last_attempt_at, created_at, updated_at";

/// Claim eligibility; binds `?1` = now, `?2` = lock cutoff (now - lock timeout)
const ELIGIBLE: &str = "((status IN ('queued', 'failed') \
        AND next_attempt_at IS NOT NULL AND next_attempt_at <= ?1) \
     OR (status = 'processing' AND (locked_at IS NULL OR locked_at < ?2)))";

/// Live lock; binds `?2` = lock cutoff
const LIVE_LOCK: &str = "(status = 'processing' AND locked_at IS NOT NULL AND locked_at >= ?2)";

fn job_from_row(row: &Row) -> rusqlite::Result<ExtractionJob> {
    let raw_id: String = row.get(0)?;
    let id = JobId::parse(&raw_id)
        .map_err(|e| conversion_error(0, Type::Text, StoreError::InvalidData(e)))?;

    let raw_status: String = row.get(3)?;
    let status = JobStatus::parse(&raw_status).ok_or_else(|| {
        conversion_error(
            3,
            Type::Text,
            StoreError::InvalidData(format!("Unknown job status: {}", raw_status)),
        )
    })?;

    Ok(ExtractionJob {
        id,
        document_id: DocumentId::from(row.get::<_, String>(1)?),
        case_id: CaseId::from(row.get::<_, String>(2)?),
        status,
        attempt_count: row.get(4)?,
        max_attempts: row.get(5)?,
        next_attempt_at: opt_from_millis(6, row.get(6)?)?,
        locked_at: opt_from_millis(7, row.get(7)?)?,
        locked_by: row.get(8)?,
        last_error: row.get(9)?,
        last_attempt_at: opt_from_millis(10, row.get(10)?)?,
        created_at: from_millis(11, row.get(11)?)?,
        updated_at: from_millis(12, row.get(12)?)?,
    })
}

fn result_from_row(row: &Row) -> rusqlite::Result<ExtractionResult> {
    let structured: Option<String> = row.get(4)?;
    let meta: String = row.get(5)?;
    Ok(ExtractionResult {
        document_id: DocumentId::from(row.get::<_, String>(0)?),
        provider: row.get(1)?,
        model: row.get(2)?,
        extracted_text: row.get(3)?,
        structured_json: structured.as_deref().map(|raw| json_column(4, raw)).transpose()?,
        meta: json_column(5, &meta)?,
        updated_at: from_millis(6, row.get(6)?)?,
    })
}

impl SqliteStore {
    /// Lock cutoff: locks taken before this instant are expired
    fn lock_cutoff(&self, now: DateTime<Utc>) -> i64 {
        to_millis(
            now.checked_sub_signed(self.lock_timeout)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        )
    }

    /// Distinguish a missing job from one in the wrong state after a refused update
    fn refusal(&self, job_id: JobId, reason: impl FnOnce(&ExtractionJob) -> String) -> StoreError {
        match self.job(job_id) {
            Ok(Some(job)) => StoreError::InvalidState(reason(&job)),
            Ok(None) => StoreError::NotFound(format!("job {}", job_id)),
            Err(e) => e,
        }
    }

    /// Error for an outcome write whose claim is no longer held
    fn lost_lease(&self, job_id: JobId, locked_by: Option<&str>) -> StoreError {
        match self.job(job_id) {
            Ok(Some(job)) => StoreError::LeaseLost(format!(
                "job {} is no longer held by {} (now {}, locked by {})",
                job.id,
                locked_by.unwrap_or("an unclaimed snapshot"),
                job.status,
                job.locked_by.as_deref().unwrap_or("nobody")
            )),
            Ok(None) => StoreError::NotFound(format!("job {}", job_id)),
            Err(e) => e,
        }
    }
}

impl JobStore for SqliteStore {
    type Error = StoreError;

    fn lock_timeout(&self) -> chrono::Duration {
        self.lock_timeout
    }

    fn create_job(
        &mut self,
        document_id: &DocumentId,
        case_id: &CaseId,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<ExtractionJob, Self::Error> {
        if let Some(existing) = self.job_for_document(document_id)? {
            return Ok(existing);
        }

        let job = ExtractionJob::new(document_id.clone(), case_id.clone(), max_attempts, now);
        self.conn.execute(
            "INSERT INTO extraction_jobs (id, document_id, case_id, status, attempt_count, max_attempts,
                                          next_attempt_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6, ?6)
             ON CONFLICT(document_id) DO NOTHING",
            params![
                job.id.to_string(),
                job.document_id.as_str(),
                job.case_id.as_str(),
                job.status.as_str(),
                job.max_attempts,
                to_millis(now),
            ],
        )?;

        // A concurrent creator may have won; the stored row is authoritative
        self.job_for_document(document_id)?
            .ok_or_else(|| StoreError::NotFound(format!("job for document {}", document_id)))
    }

    fn claim_jobs(
        &mut self,
        limit: usize,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExtractionJob>, Self::Error> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now_ms = to_millis(now);
        let cutoff = self.lock_cutoff(now);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidates = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM extraction_jobs WHERE {}
                 ORDER BY next_attempt_at IS NULL, next_attempt_at, created_at, id
                 LIMIT ?3",
                JOB_COLUMNS, ELIGIBLE
            ))?;
            let rows = stmt
                .query_map(params![now_ms, cutoff, limit], job_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut claimed = Vec::with_capacity(candidates.len());
        {
            let mut update = tx.prepare(&format!(
                "UPDATE extraction_jobs
                 SET status = 'processing', locked_at = ?1, locked_by = ?4,
                     last_attempt_at = ?1, updated_at = ?1
                 WHERE id = ?3 AND {}",
                ELIGIBLE
            ))?;

            for mut job in candidates {
                let changed = update.execute(params![now_ms, cutoff, job.id.to_string(), worker_id])?;
                if changed == 1 {
                    job.status = JobStatus::Processing;
                    job.locked_at = Some(now);
                    job.locked_by = Some(worker_id.to_string());
                    job.last_attempt_at = Some(now);
                    job.updated_at = now;
                    claimed.push(job);
                }
            }
        }

        tx.commit()?;

        if !claimed.is_empty() {
            debug!(worker_id, count = claimed.len(), "Claimed jobs");
        }
        Ok(claimed)
    }

    fn release_expired_locks(&mut self, now: DateTime<Utc>) -> Result<usize, Self::Error> {
        let released = self.conn.execute(
            "UPDATE extraction_jobs
             SET locked_at = NULL, locked_by = NULL, updated_at = ?1
             WHERE locked_at IS NOT NULL AND locked_at < ?2",
            params![to_millis(now), self.lock_cutoff(now)],
        )?;
        Ok(released)
    }

    fn mark_success(
        &mut self,
        job: &ExtractionJob,
        result: &ExtractionResult,
        observations: &[FieldObservation],
        now: DateTime<Utc>,
    ) -> Result<(), Self::Error> {
        let structured = result
            .structured_json
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let meta = serde_json::to_string(&result.meta)?;

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO extraction_results
                 (document_id, provider, model, extracted_text, structured_json, meta, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(document_id) DO UPDATE SET
                 provider = excluded.provider,
                 model = excluded.model,
                 extracted_text = excluded.extracted_text,
                 structured_json = excluded.structured_json,
                 meta = excluded.meta,
                 updated_at = excluded.updated_at",
            params![
                result.document_id.as_str(),
                &result.provider,
                &result.model,
                &result.extracted_text,
                structured,
                meta,
                to_millis(result.updated_at),
            ],
        )?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO field_observations
                     (case_id, document_id, field_key, value, confidence, source_document_category, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for obs in observations {
                insert.execute(params![
                    obs.case_id.as_str(),
                    obs.document_id.as_str(),
                    &obs.field_key,
                    &obs.value,
                    obs.confidence,
                    &obs.source_document_category,
                    to_millis(obs.observed_at),
                ])?;
            }
        }

        let changed = tx.execute(
            "UPDATE extraction_jobs
             SET status = 'succeeded', locked_at = NULL, locked_by = NULL,
                 next_attempt_at = NULL, last_error = NULL, updated_at = ?1
             WHERE id = ?2 AND status = 'processing' AND locked_by = ?3 AND locked_at = ?4",
            params![
                to_millis(now),
                job.id.to_string(),
                job.locked_by.as_deref(),
                job.locked_at.map(to_millis),
            ],
        )?;
        if changed == 0 {
            // Rolls back the result and observations
            drop(tx);
            return Err(self.lost_lease(job.id, job.locked_by.as_deref()));
        }

        tx.commit()?;
        Ok(())
    }

    fn mark_failure(&mut self, update: &FailureUpdate) -> Result<(), Self::Error> {
        let changed = self.conn.execute(
            "UPDATE extraction_jobs
             SET attempt_count = ?1, status = ?2, last_error = ?3, next_attempt_at = ?4,
                 max_attempts = ?5, locked_at = NULL, locked_by = NULL, updated_at = ?6
             WHERE id = ?7 AND status = 'processing' AND locked_by = ?8 AND locked_at = ?9",
            params![
                update.attempt_count,
                update.status.as_str(),
                &update.last_error,
                update.next_attempt_at.map(to_millis),
                update.max_attempts.max(1),
                to_millis(update.updated_at),
                update.job_id.to_string(),
                update.locked_by.as_deref(),
                update.locked_at.map(to_millis),
            ],
        )?;
        if changed == 0 {
            return Err(self.lost_lease(update.job_id, update.locked_by.as_deref()));
        }
        Ok(())
    }

    fn reset_job(&mut self, job_id: JobId, now: DateTime<Utc>) -> Result<ExtractionJob, Self::Error> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE extraction_jobs
                 SET status = 'queued', attempt_count = 0, last_error = NULL,
                     locked_at = NULL, locked_by = NULL, next_attempt_at = ?1, updated_at = ?1
                 WHERE id = ?3 AND NOT {}",
                LIVE_LOCK
            ),
            params![to_millis(now), self.lock_cutoff(now), job_id.to_string()],
        )?;

        if changed == 0 {
            return Err(self.refusal(job_id, |job| {
                format!(
                    "job {} is being processed by {}",
                    job.id,
                    job.locked_by.as_deref().unwrap_or("an unknown worker")
                )
            }));
        }

        self.job(job_id)?
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))
    }

    fn make_eligible(&mut self, job_id: JobId, now: DateTime<Utc>) -> Result<ExtractionJob, Self::Error> {
        let changed = self.conn.execute(
            "UPDATE extraction_jobs
             SET next_attempt_at = ?1, updated_at = ?1
             WHERE id = ?2 AND status IN ('queued', 'failed')",
            params![to_millis(now), job_id.to_string()],
        )?;

        if changed == 0 {
            return Err(self.refusal(job_id, |job| {
                format!("job {} is {} and cannot be resumed", job.id, job.status)
            }));
        }

        self.job(job_id)?
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))
    }

    fn job(&self, id: JobId) -> Result<Option<ExtractionJob>, Self::Error> {
        let job = self
            .conn
            .query_row(
                &format!("SELECT {} FROM extraction_jobs WHERE id = ?1", JOB_COLUMNS),
                params![id.to_string()],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn job_for_document(&self, document_id: &DocumentId) -> Result<Option<ExtractionJob>, Self::Error> {
        let job = self
            .conn
            .query_row(
                &format!("SELECT {} FROM extraction_jobs WHERE document_id = ?1", JOB_COLUMNS),
                params![document_id.as_str()],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<ExtractionJob>, Self::Error> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM extraction_jobs
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY updated_at DESC, created_at DESC
             LIMIT ?2",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map(params![status.map(|s| s.as_str()), limit], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn job_counts(&self) -> Result<JobCounts, Self::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM extraction_jobs GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = JobCounts::default();
        for (raw_status, count) in rows {
            let status = JobStatus::parse(&raw_status)
                .ok_or_else(|| StoreError::InvalidData(format!("Unknown job status: {}", raw_status)))?;
            counts.record(status, usize::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    fn result(&self, document_id: &DocumentId) -> Result<Option<ExtractionResult>, Self::Error> {
        let result = self
            .conn
            .query_row(
                "SELECT document_id, provider, model, extracted_text, structured_json, meta, updated_at
                 FROM extraction_results WHERE document_id = ?1",
                params![document_id.as_str()],
                result_from_row,
            )
            .optional()?;
        Ok(result)
    }
}
