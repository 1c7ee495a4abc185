//! Integration tests for quarry-store
//!
//! These tests exercise the job lifecycle against real SQLite databases,
//! including several connections racing for the same rows.

use chrono::{DateTime, Duration, TimeZone, Utc};
use quarry_domain::traits::{AuditSink, DocumentCatalog, InsightStore, JobStore, OpsStore};
use quarry_domain::{
    AuditEvent, AuditKind, CaseId, DocumentId, DocumentVersion, ExtractionJob, ExtractionResult, FailureUpdate,
    FieldObservation, InsightSnapshot, JobStatus,
};
use quarry_store::{SqliteStore, StoreError};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
}

fn store() -> SqliteStore {
    SqliteStore::new(":memory:").unwrap()
}

fn doc(n: usize) -> DocumentId {
    DocumentId::from(format!("doc-{n}"))
}

fn case() -> CaseId {
    CaseId::from("case-1")
}

fn result_for(document_id: &DocumentId, now: DateTime<Utc>) -> ExtractionResult {
    ExtractionResult {
        document_id: document_id.clone(),
        provider: "mock".to_string(),
        model: "mock-1".to_string(),
        extracted_text: "Acme LLC".to_string(),
        structured_json: Some(json!({"business_name": "Acme LLC"})),
        meta: json!({"attempt": 1}),
        updated_at: now,
    }
}

fn observation(document_id: &DocumentId, key: &str, value: &str, now: DateTime<Utc>) -> FieldObservation {
    FieldObservation {
        case_id: case(),
        document_id: document_id.clone(),
        field_key: key.to_string(),
        value: value.to_string(),
        confidence: 0.9,
        source_document_category: "application".to_string(),
        observed_at: now,
    }
}

#[test]
fn test_store_initialization() {
    let store = SqliteStore::new(":memory:");
    assert!(store.is_ok(), "Store should initialize successfully");
}

#[test]
fn test_create_job_is_idempotent() {
    let mut store = store();
    let now = t0();

    let first = store.create_job(&doc(1), &case(), 5, now).unwrap();
    assert_eq!(first.status, JobStatus::Queued);
    assert_eq!(first.attempt_count, 0);
    assert_eq!(first.next_attempt_at, Some(now));

    let second = store
        .create_job(&doc(1), &CaseId::from("other"), 9, now + Duration::seconds(5))
        .unwrap();
    assert_eq!(second, first, "existing row must be returned unchanged");
    assert_eq!(store.job_counts().unwrap().total(), 1);
}

#[test]
fn test_claim_sets_lock_and_skips_future_jobs() {
    let mut store = store();
    let now = t0();
    store.create_job(&doc(1), &case(), 5, now).unwrap();
    store.create_job(&doc(2), &case(), 5, now + Duration::seconds(60)).unwrap();

    let claimed = store.claim_jobs(10, "w1", now).unwrap();
    assert_eq!(claimed.len(), 1);
    let job = &claimed[0];
    assert_eq!(job.document_id, doc(1));
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.locked_by.as_deref(), Some("w1"));
    assert_eq!(job.last_attempt_at, Some(now));

    let stored = store.job(job.id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.locked_at, Some(now));

    // Nothing else eligible yet; a second claim returns nothing
    assert!(store.claim_jobs(10, "w2", now).unwrap().is_empty());
    assert!(store.claim_jobs(0, "w2", now + Duration::hours(1)).unwrap().is_empty());
}

#[test]
fn test_claim_orders_by_next_attempt() {
    let mut store = store();
    let now = t0();
    store.create_job(&doc(1), &case(), 5, now - Duration::seconds(10)).unwrap();
    store.create_job(&doc(2), &case(), 5, now - Duration::seconds(30)).unwrap();
    store.create_job(&doc(3), &case(), 5, now - Duration::seconds(20)).unwrap();

    let claimed = store.claim_jobs(2, "w1", now).unwrap();
    let docs: Vec<_> = claimed.iter().map(|j| j.document_id.clone()).collect();
    assert_eq!(docs, vec![doc(2), doc(3)]);
}

#[test]
fn test_concurrent_claims_never_overlap() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quarry.db");
    let now = t0();

    {
        let mut store = SqliteStore::new(&path).unwrap();
        for n in 0..60 {
            store.create_job(&doc(n), &case(), 5, now).unwrap();
        }
    }

    let workers = 6;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|w| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut store = SqliteStore::new(&path).unwrap();
                barrier.wait();
                let mut mine = Vec::new();
                loop {
                    let batch = store.claim_jobs(4, &format!("w{w}"), now).unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    mine.extend(batch.into_iter().map(|j| j.id));
                }
                mine
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.join().unwrap() {
            total += 1;
            assert!(seen.insert(id), "job {id} claimed twice");
        }
    }
    assert_eq!(total, 60);
}

#[test]
fn test_expired_lock_is_reclaimed() {
    let mut store = SqliteStore::new(":memory:")
        .unwrap()
        .with_lock_timeout(std::time::Duration::from_secs(600));
    let now = t0();
    store.create_job(&doc(1), &case(), 5, now).unwrap();
    let first = store.claim_jobs(1, "crashed", now).unwrap();
    assert_eq!(first.len(), 1);

    // Still locked inside the timeout
    assert!(store.claim_jobs(1, "w2", now + Duration::minutes(9)).unwrap().is_empty());

    let later = now + Duration::minutes(11);
    let reclaimed = store.claim_jobs(1, "w2", later).unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, first[0].id);
    assert_eq!(reclaimed[0].locked_by.as_deref(), Some("w2"));
    assert_eq!(reclaimed[0].attempt_count, 0);
}

#[test]
fn test_release_expired_locks_keeps_status() {
    let mut store = store();
    let now = t0();
    store.create_job(&doc(1), &case(), 5, now).unwrap();
    store.create_job(&doc(2), &case(), 5, now).unwrap();
    store.claim_jobs(1, "old", now).unwrap();
    store.claim_jobs(1, "fresh", now + Duration::minutes(8)).unwrap();

    let released = store.release_expired_locks(now + Duration::minutes(12)).unwrap();
    assert_eq!(released, 1);

    let old = store.job_for_document(&doc(1)).unwrap().unwrap();
    assert_eq!(old.status, JobStatus::Processing);
    assert!(old.locked_at.is_none());
    assert!(old.locked_by.is_none());

    let fresh = store.job_for_document(&doc(2)).unwrap().unwrap();
    assert_eq!(fresh.locked_by.as_deref(), Some("fresh"));

    // The released job is claimable again straight away
    let again = store.claim_jobs(5, "w3", now + Duration::minutes(12)).unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].document_id, doc(1));
}

#[test]
fn test_bounded_retries_end_canceled() {
    let mut store = store();
    let mut now = t0();
    store.create_job(&doc(1), &case(), 3, now).unwrap();

    for attempt in 1..=3u32 {
        let claimed = store.claim_jobs(1, "w1", now).unwrap();
        assert_eq!(claimed.len(), 1, "attempt {attempt} should be claimable");
        let update = FailureUpdate::after_failure(&claimed[0], "provider down", std::time::Duration::from_secs(30), now);
        store.mark_failure(&update).unwrap();

        let job = store.job(claimed[0].id).unwrap().unwrap();
        assert_eq!(job.attempt_count, attempt);
        assert!(job.locked_at.is_none());
        if attempt < 3 {
            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.next_attempt_at, Some(now + Duration::seconds(30)));
            // Not eligible before the backoff elapses
            assert!(store.claim_jobs(1, "w1", now + Duration::seconds(29)).unwrap().is_empty());
        } else {
            assert_eq!(job.status, JobStatus::Canceled);
            assert!(job.next_attempt_at.is_none());
            assert_eq!(job.last_error.as_deref(), Some("provider down"));
        }
        now += Duration::seconds(30);
    }

    assert!(store.claim_jobs(1, "w1", now + Duration::days(1)).unwrap().is_empty());
}

#[test]
fn test_mark_success_persists_everything() {
    let mut store = store();
    let now = t0();
    let job = store.create_job(&doc(1), &case(), 5, now).unwrap();
    let claimed = store.claim_jobs(1, "w1", now).unwrap();

    let observations = vec![
        observation(&doc(1), "business_name", "Acme LLC", now),
        observation(&doc(1), "total_revenue", "$1,000", now),
    ];
    store
        .mark_success(&claimed[0], &result_for(&doc(1), now), &observations, now)
        .unwrap();

    let job = store.job(job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.next_attempt_at.is_none());
    assert!(job.locked_at.is_none());
    assert!(job.last_error.is_none());

    let result = store.result(&doc(1)).unwrap().unwrap();
    assert_eq!(result.extracted_text, "Acme LLC");
    assert_eq!(result.structured_json, Some(json!({"business_name": "Acme LLC"})));
    assert_eq!(store.observations_for_case(&case()).unwrap(), observations);
}

#[test]
fn test_result_upsert_never_duplicates() {
    let mut store = store();
    let now = t0();
    let job = store.create_job(&doc(1), &case(), 5, now).unwrap();
    let first = store.claim_jobs(1, "w1", now).unwrap();
    store.mark_success(&first[0], &result_for(&doc(1), now), &[], now).unwrap();

    // Re-run after an administrative reset
    let later = now + Duration::seconds(5);
    store.reset_job(job.id, later).unwrap();
    let again = store.claim_jobs(1, "w1", later).unwrap();
    let mut second = result_for(&doc(1), later);
    second.extracted_text = "Acme Holdings".to_string();
    store.mark_success(&again[0], &second, &[], later).unwrap();

    let stored = store.result(&doc(1)).unwrap().unwrap();
    assert_eq!(stored.extracted_text, "Acme Holdings");
}

#[test]
fn test_mark_success_rolls_back_for_unknown_job() {
    let mut store = store();
    let now = t0();
    let mut orphan = ExtractionJob::new(doc(9), case(), 5, now);
    orphan.status = JobStatus::Processing;
    orphan.locked_by = Some("w1".to_string());
    orphan.locked_at = Some(now);

    let err = store
        .mark_success(&orphan, &result_for(&doc(9), now), &[observation(&doc(9), "tax_id", "1", now)], now)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(store.result(&doc(9)).unwrap().is_none());
    assert!(store.observations_for_case(&case()).unwrap().is_empty());
}

#[test]
fn test_late_failure_after_reclaim_is_refused() {
    let mut store = store();
    let now = t0();
    let job = store.create_job(&doc(1), &case(), 5, now).unwrap();
    let stale = store.claim_jobs(1, "w1", now).unwrap().remove(0);

    // w1 stalls past the lock timeout; w2 reclaims and finishes
    let later = now + Duration::minutes(11);
    let fresh = store.claim_jobs(1, "w2", later).unwrap().remove(0);
    assert_eq!(fresh.id, job.id);
    store.mark_success(&fresh, &result_for(&doc(1), later), &[], later).unwrap();

    let update = FailureUpdate::after_failure(&stale, "timed out", std::time::Duration::from_secs(30), later);
    let err = store.mark_failure(&update).unwrap_err();
    assert!(matches!(err, StoreError::LeaseLost(_)), "got {err:?}");

    let stored = store.job(job.id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Succeeded);
    assert_eq!(stored.attempt_count, 0);
    assert!(stored.last_error.is_none());
    assert!(stored.next_attempt_at.is_none());
}

#[test]
fn test_late_failure_never_lowers_attempt_count() {
    let mut store = store();
    let mut now = t0();
    let job = store.create_job(&doc(1), &case(), 5, now).unwrap();
    let stale = store.claim_jobs(1, "w1", now).unwrap().remove(0);

    // Two other workers reclaim in turn and each fail once
    now += Duration::minutes(11);
    for worker in ["w2", "w3"] {
        let claimed = store.claim_jobs(1, worker, now).unwrap().remove(0);
        let update = FailureUpdate::after_failure(&claimed, "provider down", std::time::Duration::from_secs(30), now);
        store.mark_failure(&update).unwrap();
        now += Duration::seconds(30);
    }
    assert_eq!(store.job(job.id).unwrap().unwrap().attempt_count, 2);

    let update = FailureUpdate::after_failure(&stale, "timed out", std::time::Duration::from_secs(30), now);
    assert_eq!(update.attempt_count, 1);
    let err = store.mark_failure(&update).unwrap_err();
    assert!(matches!(err, StoreError::LeaseLost(_)));

    let stored = store.job(job.id).unwrap().unwrap();
    assert_eq!(stored.attempt_count, 2);
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.last_error.as_deref(), Some("provider down"));
}

#[test]
fn test_late_success_after_reclaim_rolls_back() {
    let mut store = store();
    let now = t0();
    let job = store.create_job(&doc(1), &case(), 5, now).unwrap();
    let stale = store.claim_jobs(1, "w1", now).unwrap().remove(0);

    let later = now + Duration::minutes(11);
    let fresh = store.claim_jobs(1, "w2", later).unwrap().remove(0);

    let err = store
        .mark_success(&stale, &result_for(&doc(1), later), &[observation(&doc(1), "tax_id", "1", later)], later)
        .unwrap_err();
    assert!(matches!(err, StoreError::LeaseLost(_)));
    assert!(store.result(&doc(1)).unwrap().is_none());
    assert!(store.observations_for_case(&case()).unwrap().is_empty());

    // The current holder is unaffected
    let stored = store.job(job.id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.locked_by.as_deref(), Some("w2"));
    store.mark_success(&fresh, &result_for(&doc(1), later), &[], later).unwrap();
}

#[test]
fn test_mark_after_lock_sweep_is_refused() {
    let mut store = store();
    let now = t0();
    store.create_job(&doc(1), &case(), 5, now).unwrap();
    let claimed = store.claim_jobs(1, "w1", now).unwrap().remove(0);

    // Same worker, same job, but the claim was swept
    assert_eq!(store.release_expired_locks(now + Duration::minutes(11)).unwrap(), 1);
    let update = FailureUpdate::after_failure(&claimed, "late", std::time::Duration::from_secs(30), now);
    assert!(matches!(store.mark_failure(&update), Err(StoreError::LeaseLost(_))));

    // A snapshot that was never claimed holds no lease either
    let unclaimed = store.create_job(&doc(2), &case(), 5, now).unwrap();
    let err = store.mark_success(&unclaimed, &result_for(&doc(2), now), &[], now).unwrap_err();
    assert!(matches!(err, StoreError::LeaseLost(_)));
    assert_eq!(store.job(unclaimed.id).unwrap().unwrap().status, JobStatus::Queued);
}

#[test]
fn test_reset_job() {
    let mut store = store();
    let now = t0();
    let job = store.create_job(&doc(1), &case(), 1, now).unwrap();
    let claimed = store.claim_jobs(1, "w1", now).unwrap();

    // Live lock: refused
    let err = store.reset_job(job.id, now + Duration::minutes(1)).unwrap_err();
    assert!(matches!(err, StoreError::InvalidState(_)));

    let update = FailureUpdate::after_failure(&claimed[0], "boom", std::time::Duration::from_secs(30), now);
    store.mark_failure(&update).unwrap();
    assert_eq!(store.job(job.id).unwrap().unwrap().status, JobStatus::Canceled);

    let later = now + Duration::minutes(2);
    let reset = store.reset_job(job.id, later).unwrap();
    assert_eq!(reset.status, JobStatus::Queued);
    assert_eq!(reset.attempt_count, 0);
    assert!(reset.last_error.is_none());
    assert_eq!(reset.next_attempt_at, Some(later));

    let missing = store.reset_job(quarry_domain::JobId::new(), later).unwrap_err();
    assert!(matches!(missing, StoreError::NotFound(_)));
}

#[test]
fn test_reset_allowed_after_lock_expiry() {
    let mut store = store();
    let now = t0();
    let job = store.create_job(&doc(1), &case(), 5, now).unwrap();
    store.claim_jobs(1, "crashed", now).unwrap();

    let reset = store.reset_job(job.id, now + Duration::minutes(11)).unwrap();
    assert_eq!(reset.status, JobStatus::Queued);
    assert!(reset.locked_by.is_none());
}

#[test]
fn test_make_eligible_keeps_attempts() {
    let mut store = store();
    let now = t0();
    let job = store.create_job(&doc(1), &case(), 5, now).unwrap();
    let claimed = store.claim_jobs(1, "w1", now).unwrap();
    let update = FailureUpdate::after_failure(&claimed[0], "boom", std::time::Duration::from_secs(600), now);
    store.mark_failure(&update).unwrap();

    let later = now + Duration::seconds(60);
    let resumed = store.make_eligible(job.id, later).unwrap();
    assert_eq!(resumed.status, JobStatus::Failed);
    assert_eq!(resumed.attempt_count, 1);
    assert_eq!(resumed.next_attempt_at, Some(later));
    assert_eq!(store.claim_jobs(1, "w1", later).unwrap().len(), 1);

    // Processing jobs cannot be resumed
    let err = store.make_eligible(job.id, later).unwrap_err();
    assert!(matches!(err, StoreError::InvalidState(_)));
}

#[test]
fn test_list_and_count_jobs() {
    let mut store = store();
    let now = t0();
    for n in 0..4 {
        store.create_job(&doc(n), &case(), 5, now).unwrap();
    }
    store.claim_jobs(1, "w1", now).unwrap();

    let counts = store.job_counts().unwrap();
    assert_eq!(counts.queued, 3);
    assert_eq!(counts.processing, 1);

    assert_eq!(store.list_jobs(None, 10).unwrap().len(), 4);
    assert_eq!(store.list_jobs(Some(JobStatus::Processing), 10).unwrap().len(), 1);
    assert_eq!(store.list_jobs(Some(JobStatus::Queued), 2).unwrap().len(), 2);
}

#[test]
fn test_document_versions() {
    let mut store = store();
    let now = t0();
    let document = DocumentVersion {
        document_id: doc(1),
        case_id: case(),
        version: 0,
        content_ref: "cases/1/v1.pdf".to_string(),
        mime_type: Some("application/pdf".to_string()),
        file_name: "v1.pdf".to_string(),
        category: "bank_statement".to_string(),
    };

    let v1 = store.register_document(document.clone(), now).unwrap();
    assert_eq!(v1.version, 1);

    let v2 = store
        .register_document(
            DocumentVersion {
                content_ref: "cases/1/v2.pdf".to_string(),
                ..document.clone()
            },
            now,
        )
        .unwrap();
    assert_eq!(v2.version, 2);

    let current = store.current_version(&doc(1)).unwrap().unwrap();
    assert_eq!(current.content_ref, "cases/1/v2.pdf");
    assert!(store.current_version(&doc(2)).unwrap().is_none());

    let blank = store.register_document(
        DocumentVersion {
            content_ref: " ".to_string(),
            ..document
        },
        now,
    );
    assert!(matches!(blank, Err(StoreError::InvalidData(_))));
}

#[test]
fn test_snapshot_round_trip() {
    let mut store = store();
    let now = t0();
    assert!(store.latest_snapshot(&case()).unwrap().is_none());

    let mut snapshot = InsightSnapshot::empty(case(), now);
    snapshot.missing_fields = vec!["tax_id".to_string()];
    store.save_snapshot(&snapshot).unwrap();

    snapshot.missing_fields.clear();
    snapshot.computed_at = now + Duration::seconds(1);
    store.save_snapshot(&snapshot).unwrap();

    assert_eq!(store.latest_snapshot(&case()).unwrap(), Some(snapshot));
}

#[test]
fn test_kill_switch_flag() {
    let mut store = store();
    assert!(!store.extraction_disabled().unwrap());
    store.set_extraction_disabled(true, t0()).unwrap();
    assert!(store.extraction_disabled().unwrap());
    store.set_extraction_disabled(false, t0()).unwrap();
    assert!(!store.extraction_disabled().unwrap());
}

#[test]
fn test_audit_log() {
    let mut store = store();
    let now = t0();
    store.record(AuditEvent::new(
        AuditKind::StorageInputRejected,
        "doc-1",
        json!({"reference": "http://evil"}),
        now,
    ));
    store.record(AuditEvent::new(AuditKind::JobReset, "doc-2", json!({}), now));

    let all = store.recent_audit_events(None, 10).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].kind, AuditKind::JobReset, "newest first");

    let rejected = store
        .recent_audit_events(Some(AuditKind::StorageInputRejected), 10)
        .unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].detail, json!({"reference": "http://evil"}));
}
