//! Background worker that polls for extraction jobs

use crate::processor::{lock_store, JobContext, JobOutcome};
use crate::{WorkerConfig, WorkerError, WorkerMetrics};
use chrono::Utc;
use quarry_domain::traits::{
    AuditSink, ContentStorage, DocumentCatalog, ExtractionProvider, InsightStore, OpsStore,
};
use quarry_domain::{BreakerRegistry, BreakerState, JobFamily, JobStatus};
use quarry_reconciler::Reconciler;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Everything the worker needs from a store
pub trait WorkerStore: InsightStore + OpsStore + DocumentCatalog + AuditSink + Send + 'static {}

impl<T> WorkerStore for T where T: InsightStore + OpsStore + DocumentCatalog + AuditSink + Send + 'static {}

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// Swept, claimed and processed a batch (possibly empty)
    Ran,
    /// Extraction is disabled; nothing was touched
    Disabled,
    /// Another tick was still running
    Overlapping,
}

/// Outcome of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// What the tick did
    pub status: TickStatus,
    /// Counters for this tick alone
    pub metrics: WorkerMetrics,
}

/// Clears the tick flag when the tick ends, even on early return
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn apply(metrics: &mut WorkerMetrics, outcome: JobOutcome) {
    match outcome {
        JobOutcome::Succeeded { reconcile_failed } => {
            metrics.succeeded += 1;
            if reconcile_failed {
                metrics.reconcile_failures += 1;
            }
        }
        JobOutcome::Failed {
            status,
            storage_rejected,
        } => {
            if status == JobStatus::Canceled {
                metrics.canceled += 1;
            } else {
                metrics.failed += 1;
            }
            if storage_rejected {
                metrics.storage_rejections += 1;
            }
        }
        JobOutcome::Deferred => metrics.deferred += 1,
        JobOutcome::LeaseLost => metrics.lost_leases += 1,
        JobOutcome::StoreError => metrics.store_errors += 1,
    }
}

/// Background worker that claims and processes extraction jobs on a schedule
///
/// Each tick:
/// 1. Skips entirely while the extraction kill switch is engaged
/// 2. Clears expired locks
/// 3. Claims up to `concurrency` jobs (one while the extraction breaker is
///    probing, none while it is open)
/// 4. Processes the batch concurrently and waits for all of it
///
/// Ticks never overlap: a tick attempted while another is running is a no-op.
///
/// # Examples
///
/// ```no_run
/// use quarry_domain::BreakerRegistry;
/// use quarry_provider::PlainTextProvider;
/// use quarry_store::{LocalContentStorage, SqliteStore};
/// use quarry_worker::{ExtractionWorker, WorkerConfig};
/// use std::sync::{Arc, Mutex};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = Arc::new(Mutex::new(SqliteStore::new("quarry.db")?));
///     let worker = ExtractionWorker::new(
///         WorkerConfig::default(),
///         store,
///         Arc::new(PlainTextProvider::new()),
///         Arc::new(LocalContentStorage::new("./documents")),
///         BreakerRegistry::default(),
///     )?;
///
///     // Run until Ctrl+C
///     worker.run().await?;
///     Ok(())
/// }
/// ```
pub struct ExtractionWorker<S> {
    config: WorkerConfig,
    context: JobContext<S>,
    breakers: BreakerRegistry,
    tick_in_progress: AtomicBool,
    metrics: Mutex<WorkerMetrics>,
}

impl<S: WorkerStore> ExtractionWorker<S> {
    /// Create a worker
    ///
    /// The breaker registry is shared with whoever else gates extraction work.
    pub fn new(
        config: WorkerConfig,
        store: Arc<Mutex<S>>,
        provider: Arc<dyn ExtractionProvider>,
        storage: Arc<dyn ContentStorage>,
        breakers: BreakerRegistry,
    ) -> Result<Self, WorkerError> {
        config.validate().map_err(WorkerError::Config)?;

        let context = JobContext {
            store,
            provider,
            storage,
            breaker: breakers.get(JobFamily::Extraction.as_str()),
            reconciler: Arc::new(Reconciler::default()),
            retry: config.retry,
            provider_timeout: config.provider_timeout(),
            reconcile: config.reconcile,
            worker_id: config.worker_id.clone(),
        };

        Ok(Self {
            config,
            context,
            breakers,
            tick_in_progress: AtomicBool::new(false),
            metrics: Mutex::new(WorkerMetrics::new()),
        })
    }

    /// Use a custom reconciler (registry, tolerances)
    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.context.reconciler = Arc::new(reconciler);
        self
    }

    /// The worker configuration
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The shared breaker registry
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Whether a tick is running right now
    pub fn is_tick_in_progress(&self) -> bool {
        self.tick_in_progress.load(Ordering::Acquire)
    }

    /// Totals across all ticks so far
    pub fn metrics(&self) -> WorkerMetrics {
        self.metrics.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Reset the metrics counters
    pub fn reset_metrics(&self) {
        self.metrics.lock().unwrap_or_else(|p| p.into_inner()).reset();
    }

    fn record(&self, delta: &WorkerMetrics) {
        self.metrics.lock().unwrap_or_else(|p| p.into_inner()).merge(delta);
    }

    fn claim_limit(&self) -> usize {
        let breaker = &self.context.breaker;
        match breaker.state() {
            BreakerState::Closed => self.config.concurrency,
            _ if !breaker.is_accepting_work_at(Instant::now()) => 0,
            // Cooled down or probing: a single job is the probe
            _ => 1,
        }
    }

    /// Run one tick
    ///
    /// Per-job failures become job bookkeeping; only store failures while
    /// reading the kill switch, sweeping or claiming are returned.
    pub async fn tick(&self) -> Result<TickReport, WorkerError> {
        let Some(_guard) = TickGuard::acquire(&self.tick_in_progress) else {
            debug!(worker_id = %self.config.worker_id, "Previous tick still running, skipping");
            let delta = WorkerMetrics {
                overlapping_ticks: 1,
                ..WorkerMetrics::default()
            };
            self.record(&delta);
            return Ok(TickReport {
                status: TickStatus::Overlapping,
                metrics: delta,
            });
        };

        let mut delta = WorkerMetrics::new();
        let now = Utc::now();
        let store_error = |e: <S as quarry_domain::traits::JobStore>::Error| WorkerError::Store(e.to_string());

        let claimed = {
            let mut store = lock_store(&self.context.store);

            if store.extraction_disabled().map_err(store_error)? {
                debug!(worker_id = %self.config.worker_id, "Extraction disabled, skipping tick");
                delta.skipped_ticks = 1;
                drop(store);
                self.record(&delta);
                return Ok(TickReport {
                    status: TickStatus::Disabled,
                    metrics: delta,
                });
            }

            delta.locks_released = store.release_expired_locks(now).map_err(store_error)?;
            if delta.locks_released > 0 {
                info!(count = delta.locks_released, "Released expired job locks");
            }

            let limit = self.claim_limit();
            if limit == 0 {
                debug!("Extraction breaker open, claiming nothing");
                Vec::new()
            } else {
                store
                    .claim_jobs(limit, &self.config.worker_id, now)
                    .map_err(store_error)?
            }
        };

        delta.ticks = 1;
        delta.claimed = claimed.len();

        let mut tasks = JoinSet::new();
        for job in claimed {
            let context = self.context.clone();
            tasks.spawn(async move { context.process(job).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => apply(&mut delta, outcome),
                Err(e) if e.is_panic() => {
                    // The job keeps its lock and is reclaimed once the lock expires
                    error!(error = %e, "Job task panicked");
                    delta.panics += 1;
                }
                Err(e) => warn!(error = %e, "Job task was cancelled"),
            }
        }

        if delta.claimed > 0 {
            info!(
                worker_id = %self.config.worker_id,
                claimed = delta.claimed,
                succeeded = delta.succeeded,
                failed = delta.failed,
                canceled = delta.canceled,
                "Tick completed"
            );
        }

        self.record(&delta);
        Ok(TickReport {
            status: TickStatus::Ran,
            metrics: delta,
        })
    }

    /// Run until `shutdown` resolves
    ///
    /// Shutdown interrupts the wait between ticks; a batch in flight always
    /// finishes first.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), WorkerError>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            worker_id = %self.config.worker_id,
            interval = ?self.config.poll_interval(),
            concurrency = self.config.concurrency,
            "Extraction worker started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping worker");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Tick failed");
                    }
                }
            }
        }

        info!("Extraction worker stopped. Final metrics:\n{}", self.metrics().summary());
        Ok(())
    }

    /// Run until Ctrl+C
    pub async fn run(&self) -> Result<(), WorkerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run for a specific number of ticks (useful for testing)
    pub async fn run_cycles(&self, cycles: usize) -> Result<(), WorkerError> {
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        for cycle in 0..cycles {
            ticker.tick().await;
            debug!("Starting tick {}/{}", cycle + 1, cycles);
            self.tick().await?;
        }

        info!("Worker finished {} ticks. Final metrics:\n{}", cycles, self.metrics().summary());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = TickGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(TickGuard::acquire(&flag).is_none());
        drop(first);
        assert!(TickGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_apply_outcomes() {
        let mut metrics = WorkerMetrics::new();
        apply(&mut metrics, JobOutcome::Succeeded { reconcile_failed: true });
        apply(
            &mut metrics,
            JobOutcome::Failed {
                status: JobStatus::Canceled,
                storage_rejected: true,
            },
        );
        apply(
            &mut metrics,
            JobOutcome::Failed {
                status: JobStatus::Failed,
                storage_rejected: false,
            },
        );
        apply(&mut metrics, JobOutcome::Deferred);
        apply(&mut metrics, JobOutcome::LeaseLost);

        assert_eq!(metrics.succeeded, 1);
        assert_eq!(metrics.reconcile_failures, 1);
        assert_eq!(metrics.canceled, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.storage_rejections, 1);
        assert_eq!(metrics.deferred, 1);
        assert_eq!(metrics.lost_leases, 1);
        assert_eq!(metrics.total_processed(), 3);
    }
}
