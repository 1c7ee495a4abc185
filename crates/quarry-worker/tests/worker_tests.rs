//! Worker behavior against a real SQLite store, local content storage and a
//! scripted provider

use async_trait::async_trait;
use chrono::Utc;
use quarry_domain::traits::{DocumentCatalog, ExtractionProvider, InsightStore, JobStore, OpsStore};
use quarry_domain::{
    AuditKind, BreakerConfig, BreakerRegistry, BreakerState, CaseId, DocumentId, DocumentVersion,
    ExtractionOutput, ExtractionRequest, JobStatus, ProviderError, RetryPolicy,
};
use quarry_provider::MockProvider;
use quarry_store::{LocalContentStorage, SqliteStore};
use quarry_worker::{ExtractionWorker, TickStatus, WorkerConfig};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn config() -> WorkerConfig {
    WorkerConfig {
        worker_id: "test-worker".to_string(),
        poll_interval_ms: 10,
        concurrency: 4,
        provider_timeout_ms: 1_000,
        retry: RetryPolicy {
            base_delay_ms: 1,
            max_delay_ms: 10,
            max_attempts: 3,
        },
        reconcile: true,
    }
}

fn lenient_breakers() -> BreakerRegistry {
    BreakerRegistry::new(BreakerConfig {
        failure_threshold: 100,
        cooldown_ms: 60_000,
    })
}

struct Harness {
    dir: TempDir,
    store: Arc<Mutex<SqliteStore>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(SqliteStore::new(":memory:").unwrap())
    }

    fn with_store(store: SqliteStore) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            store: Arc::new(Mutex::new(store)),
        }
    }

    fn store(&self) -> std::sync::MutexGuard<'_, SqliteStore> {
        self.store.lock().unwrap()
    }

    /// Write a text document to disk, register it and enqueue its job
    fn add_document(&self, name: &str, body: &str) -> DocumentId {
        std::fs::write(self.dir.path().join(name), body).unwrap();
        self.add_reference(name, name, Some("text/plain"))
    }

    fn add_reference(&self, name: &str, content_ref: &str, mime_type: Option<&str>) -> DocumentId {
        let document_id = DocumentId::from(name);
        let mut store = self.store();
        store
            .register_document(
                DocumentVersion {
                    document_id: document_id.clone(),
                    case_id: CaseId::from("case-1"),
                    version: 0,
                    content_ref: content_ref.to_string(),
                    mime_type: mime_type.map(str::to_string),
                    file_name: name.to_string(),
                    category: "application".to_string(),
                },
                Utc::now(),
            )
            .unwrap();
        store
            .create_job(&document_id, &CaseId::from("case-1"), 3, Utc::now())
            .unwrap();
        document_id
    }

    fn worker(
        &self,
        config: WorkerConfig,
        provider: Arc<dyn ExtractionProvider>,
        breakers: BreakerRegistry,
    ) -> ExtractionWorker<SqliteStore> {
        ExtractionWorker::new(
            config,
            Arc::clone(&self.store),
            provider,
            Arc::new(LocalContentStorage::new(self.dir.path())),
            breakers,
        )
        .unwrap()
    }

    fn status(&self, document_id: &DocumentId) -> (JobStatus, u32) {
        let job = self.store().job_for_document(document_id).unwrap().unwrap();
        (job.status, job.attempt_count)
    }
}

#[tokio::test]
async fn test_successful_extraction_reconciles_case() {
    let harness = Harness::new();
    let doc = harness.add_document("app.txt", "Business Name: Acme LLC\nTotal Revenue: $1,000\n");
    let provider = MockProvider::new(json!({"business_name": "Acme LLC", "gross_revenue": "$1,000"}));
    let worker = harness.worker(config(), Arc::new(provider.clone()), lenient_breakers());

    let report = worker.tick().await.unwrap();
    assert_eq!(report.status, TickStatus::Ran);
    assert_eq!(report.metrics.claimed, 1);
    assert_eq!(report.metrics.succeeded, 1);
    assert_eq!(provider.call_count(), 1);

    let store = harness.store();
    let job = store.job_for_document(&doc).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.locked_at.is_none());
    assert!(job.next_attempt_at.is_none());

    let result = store.result(&doc).unwrap().unwrap();
    assert_eq!(result.provider, "mock");
    assert_eq!(result.meta["attempt"], json!(1));
    assert_eq!(result.meta["observation_count"], json!(2));

    let snapshot = store.latest_snapshot(&CaseId::from("case-1")).unwrap().unwrap();
    assert_eq!(snapshot.missing_fields, vec!["owner_name", "tax_id"]);
    assert_eq!(snapshot.fields["total_revenue"].value, "$1,000");

    let flagged = store
        .recent_audit_events(Some(AuditKind::MissingFieldsFlagged), 10)
        .unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].subject, "case-1");
}

#[tokio::test]
async fn test_kill_switch_skips_tick() {
    let harness = Harness::new();
    let doc = harness.add_document("app.txt", "Business Name: Acme");
    harness.store().set_extraction_disabled(true, Utc::now()).unwrap();

    let provider = MockProvider::default();
    let worker = harness.worker(config(), Arc::new(provider.clone()), lenient_breakers());

    let report = worker.tick().await.unwrap();
    assert_eq!(report.status, TickStatus::Disabled);
    assert_eq!(report.metrics.claimed, 0);
    assert_eq!(provider.call_count(), 0);
    assert_eq!(harness.status(&doc), (JobStatus::Queued, 0));

    // The flag is read fresh every tick
    harness.store().set_extraction_disabled(false, Utc::now()).unwrap();
    let report = worker.tick().await.unwrap();
    assert_eq!(report.status, TickStatus::Ran);
    assert_eq!(harness.status(&doc).0, JobStatus::Succeeded);

    let metrics = worker.metrics();
    assert_eq!(metrics.skipped_ticks, 1);
    assert_eq!(metrics.ticks, 1);
}

#[tokio::test]
async fn test_storage_rejection_is_audited() {
    let harness = Harness::new();
    let doc = harness.add_reference("evil.txt", "https://evil.example/evil.txt", Some("text/plain"));
    let provider = MockProvider::default();
    let worker = harness.worker(config(), Arc::new(provider.clone()), lenient_breakers());

    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.failed, 1);
    assert_eq!(report.metrics.storage_rejections, 1);
    assert_eq!(provider.call_count(), 0);
    assert_eq!(harness.status(&doc), (JobStatus::Failed, 1));

    let events = harness
        .store()
        .recent_audit_events(Some(AuditKind::StorageInputRejected), 10)
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].subject, "evil.txt");
    assert_eq!(events[0].detail["content_ref"], json!("https://evil.example/evil.txt"));

    // Rejections are not provider failures
    assert_eq!(worker.breakers().get("extraction").failure_count(), 0);
}

#[tokio::test]
async fn test_bounded_retries_end_in_canceled() {
    let harness = Harness::new();
    let doc = harness.add_document("app.txt", "x");
    let provider = MockProvider::failing(ProviderError::Failed("model unavailable".to_string()));
    let worker = harness.worker(config(), Arc::new(provider.clone()), lenient_breakers());

    let expected = [(JobStatus::Failed, 1), (JobStatus::Failed, 2), (JobStatus::Canceled, 3)];
    for want in expected {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let report = worker.tick().await.unwrap();
        assert_eq!(report.metrics.claimed, 1);
        assert_eq!(harness.status(&doc), want);
    }

    let job = harness.store().job_for_document(&doc).unwrap().unwrap();
    assert!(job.next_attempt_at.is_none());
    assert!(job.last_error.unwrap().contains("model unavailable"));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.claimed, 0);
    assert_eq!(provider.call_count(), 3);

    let metrics = worker.metrics();
    assert_eq!(metrics.failed, 2);
    assert_eq!(metrics.canceled, 1);
}

#[tokio::test]
async fn test_backoff_delays_next_claim() {
    let harness = Harness::new();
    let doc = harness.add_document("app.txt", "x");
    let mut slow_retry = config();
    slow_retry.retry = RetryPolicy {
        base_delay_ms: 60_000,
        max_delay_ms: 3_600_000,
        max_attempts: 3,
    };
    let provider = MockProvider::failing(ProviderError::Failed("down".to_string()));
    let worker = harness.worker(slow_retry, Arc::new(provider), lenient_breakers());

    worker.tick().await.unwrap();
    let job = harness.store().job_for_document(&doc).unwrap().unwrap();
    let wait = job.next_attempt_at.unwrap() - job.updated_at;
    assert_eq!(wait, chrono::Duration::seconds(60));

    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.claimed, 0);
}

#[tokio::test]
async fn test_open_breaker_claims_nothing() {
    let harness = Harness::new();
    let doc = harness.add_document("app.txt", "x");
    let breakers = BreakerRegistry::new(BreakerConfig {
        failure_threshold: 1,
        cooldown_ms: 60_000,
    });
    breakers.get("extraction").record_failure();

    let provider = MockProvider::default();
    let worker = harness.worker(config(), Arc::new(provider.clone()), breakers);

    let report = worker.tick().await.unwrap();
    assert_eq!(report.status, TickStatus::Ran);
    assert_eq!(report.metrics.claimed, 0);
    assert_eq!(provider.call_count(), 0);
    assert_eq!(harness.status(&doc), (JobStatus::Queued, 0));
}

#[tokio::test]
async fn test_cooled_breaker_claims_single_probe() {
    let harness = Harness::new();
    let first = harness.add_document("a.txt", "x");
    let second = harness.add_document("b.txt", "y");
    let breakers = BreakerRegistry::new(BreakerConfig {
        failure_threshold: 1,
        cooldown_ms: 0,
    });
    breakers.get("extraction").record_failure();
    assert_eq!(breakers.get("extraction").state(), BreakerState::Open);

    let worker = harness.worker(config(), Arc::new(MockProvider::default()), breakers.clone());

    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.claimed, 1);
    assert_eq!(report.metrics.succeeded, 1);
    assert_eq!(breakers.get("extraction").state(), BreakerState::Closed);

    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.claimed, 1);
    assert_eq!(harness.status(&first).0, JobStatus::Succeeded);
    assert_eq!(harness.status(&second).0, JobStatus::Succeeded);
}

#[tokio::test]
async fn test_provider_failures_open_breaker_without_spending_deferred_attempts() {
    let harness = Harness::new();
    let docs: Vec<DocumentId> = (0..3)
        .map(|i| harness.add_document(&format!("doc-{i}.txt"), "x"))
        .collect();
    let breakers = BreakerRegistry::new(BreakerConfig {
        failure_threshold: 2,
        cooldown_ms: 60_000,
    });
    let provider = MockProvider::failing(ProviderError::Failed("down".to_string()));
    let worker = harness.worker(config(), Arc::new(provider), breakers.clone());

    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.claimed, 3);
    assert_eq!(report.metrics.failed + report.metrics.deferred, 3);
    assert!(report.metrics.failed >= 2);
    assert_eq!(breakers.get("extraction").state(), BreakerState::Open);

    // Deferred jobs went back to the queue with their budget intact
    for doc in &docs {
        let (status, attempts) = harness.status(doc);
        match status {
            JobStatus::Queued => assert_eq!(attempts, 0),
            JobStatus::Failed => assert_eq!(attempts, 1),
            other => panic!("unexpected status {other}"),
        }
    }
}

#[tokio::test]
async fn test_provider_timeout_is_a_failure() {
    let harness = Harness::new();
    let doc = harness.add_document("slow.txt", "x");
    let mut short_timeout = config();
    short_timeout.provider_timeout_ms = 50;
    let provider = MockProvider::default().with_delay(Duration::from_millis(500));
    let worker = harness.worker(short_timeout, Arc::new(provider), lenient_breakers());

    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.failed, 1);

    let job = harness.store().job_for_document(&doc).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.last_error.unwrap().contains("timed out"));
    assert_eq!(worker.breakers().get("extraction").failure_count(), 1);
}

#[tokio::test]
async fn test_missing_document_and_mime_type_fail_job() {
    let harness = Harness::new();
    let orphan = DocumentId::from("orphan");
    harness
        .store()
        .create_job(&orphan, &CaseId::from("case-1"), 3, Utc::now())
        .unwrap();
    std::fs::write(harness.dir.path().join("untyped.bin"), b"x").unwrap();
    let untyped = harness.add_reference("untyped.bin", "untyped.bin", None);

    let worker = harness.worker(config(), Arc::new(MockProvider::default()), lenient_breakers());
    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.failed, 2);

    let store = harness.store();
    let orphan_job = store.job_for_document(&orphan).unwrap().unwrap();
    assert!(orphan_job.last_error.unwrap().contains("no stored version"));
    let untyped_job = store.job_for_document(&untyped).unwrap().unwrap();
    assert!(untyped_job.last_error.unwrap().contains("no MIME type"));
}

#[tokio::test]
async fn test_reconcile_failure_does_not_revert_success() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quarry.db");
    let harness = Harness::with_store(SqliteStore::new(&path).unwrap());
    let doc = harness.add_document("app.txt", "x");

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch("DROP TABLE insight_snapshots").unwrap();

    let provider = MockProvider::new(json!({"business_name": "Acme"}));
    let worker = harness.worker(config(), Arc::new(provider), lenient_breakers());

    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.succeeded, 1);
    assert_eq!(report.metrics.reconcile_failures, 1);

    let store = harness.store();
    assert_eq!(store.job_for_document(&doc).unwrap().unwrap().status, JobStatus::Succeeded);
    assert!(store.result(&doc).unwrap().is_some());
}

#[tokio::test]
async fn test_overlapping_ticks_are_skipped() {
    let harness = Harness::new();
    harness.add_document("app.txt", "x");
    let provider = MockProvider::default().with_delay(Duration::from_millis(200));
    let worker = harness.worker(config(), Arc::new(provider), lenient_breakers());

    let (first, second) = tokio::join!(worker.tick(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.tick().await
    });

    assert_eq!(first.unwrap().status, TickStatus::Ran);
    assert_eq!(second.unwrap().status, TickStatus::Overlapping);
    assert!(!worker.is_tick_in_progress());
    assert_eq!(worker.metrics().overlapping_ticks, 1);
}

/// Panics on one file, succeeds on everything else
struct PanickyProvider;

#[async_trait]
impl ExtractionProvider for PanickyProvider {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionOutput, ProviderError> {
        if request.file_name == "boom.txt" {
            panic!("provider bug");
        }
        Ok(MockProvider::output(json!({})))
    }
}

#[tokio::test]
async fn test_panicking_job_does_not_abort_siblings() {
    let harness = Harness::new();
    let boom = harness.add_document("boom.txt", "x");
    let fine = harness.add_document("fine.txt", "y");
    let worker = harness.worker(config(), Arc::new(PanickyProvider), lenient_breakers());

    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.claimed, 2);
    assert_eq!(report.metrics.panics, 1);
    assert_eq!(report.metrics.succeeded, 1);

    assert_eq!(harness.status(&fine).0, JobStatus::Succeeded);
    // Still locked; reclaimed once the lock expires
    assert_eq!(harness.status(&boom).0, JobStatus::Processing);
}

#[tokio::test]
async fn test_panicking_half_open_call_reopens_breaker() {
    let harness = Harness::new();
    let boom = harness.add_document("boom.txt", "x");
    let breakers = BreakerRegistry::new(BreakerConfig {
        failure_threshold: 1,
        cooldown_ms: 0,
    });
    breakers.get("extraction").record_failure();
    let mut single = config();
    single.concurrency = 1;
    let worker = harness.worker(single, Arc::new(PanickyProvider), breakers.clone());

    // The half-open call panics: counted as a failure, not left in flight
    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.claimed, 1);
    assert_eq!(report.metrics.panics, 1);
    assert_eq!(breakers.get("extraction").state(), BreakerState::Open);
    assert_eq!(harness.status(&boom).0, JobStatus::Processing);

    // The next cooled check admits a new call
    let fine = harness.add_document("fine.txt", "y");
    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.claimed, 1);
    assert_eq!(report.metrics.succeeded, 1);
    assert_eq!(report.metrics.deferred, 0);
    assert_eq!(harness.status(&fine).0, JobStatus::Succeeded);
    assert_eq!(breakers.get("extraction").state(), BreakerState::Closed);
}

#[tokio::test]
async fn test_outcome_dropped_after_reclaim() {
    let store = SqliteStore::new(":memory:")
        .unwrap()
        .with_lock_timeout(Duration::from_millis(50));
    let harness = Harness::with_store(store);
    let doc = harness.add_document("slow.txt", "x");
    let provider = MockProvider::default().with_delay(Duration::from_millis(300));
    let worker = harness.worker(config(), Arc::new(provider), lenient_breakers());

    // The lock expires mid-call and another worker takes the job over
    let (report, reclaimed) = tokio::join!(worker.tick(), async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        harness.store().claim_jobs(1, "other-worker", Utc::now()).unwrap()
    });
    assert_eq!(reclaimed.len(), 1);

    let report = report.unwrap();
    assert_eq!(report.metrics.lost_leases, 1);
    assert_eq!(report.metrics.succeeded, 0);
    assert_eq!(report.metrics.store_errors, 0);

    let store = harness.store();
    let job = store.job_for_document(&doc).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.locked_by.as_deref(), Some("other-worker"));
    assert!(store.result(&doc).unwrap().is_none());
}

#[tokio::test]
async fn test_concurrency_bounds_batch() {
    let harness = Harness::new();
    for i in 0..5 {
        harness.add_document(&format!("doc-{i}.txt"), "x");
    }
    let mut small_batches = config();
    small_batches.concurrency = 2;
    let provider = MockProvider::default().with_delay(Duration::from_millis(20));
    let worker = harness.worker(small_batches, Arc::new(provider.clone()), lenient_breakers());

    let report = worker.tick().await.unwrap();
    assert_eq!(report.metrics.claimed, 2);
    assert!(provider.max_concurrent_calls() <= 2);

    worker.run_cycles(3).await.unwrap();
    assert_eq!(worker.metrics().succeeded, 5);
    assert_eq!(harness.store().job_counts().unwrap().succeeded, 5);
}

#[tokio::test]
async fn test_run_until_stops_on_shutdown() {
    let harness = Harness::new();
    let doc = harness.add_document("app.txt", "x");
    let worker = harness.worker(config(), Arc::new(MockProvider::default()), lenient_breakers());

    worker
        .run_until(tokio::time::sleep(Duration::from_millis(100)))
        .await
        .unwrap();

    assert!(worker.metrics().ticks >= 1);
    assert_eq!(harness.status(&doc).0, JobStatus::Succeeded);
}

#[test]
fn test_invalid_config_rejected() {
    let harness = Harness::new();
    let mut bad = config();
    bad.concurrency = 0;
    let result = ExtractionWorker::new(
        bad,
        Arc::clone(&harness.store),
        Arc::new(MockProvider::default()),
        Arc::new(LocalContentStorage::new(harness.dir.path())),
        BreakerRegistry::default(),
    );
    assert!(matches!(result, Err(quarry_worker::WorkerError::Config(_))));
}
