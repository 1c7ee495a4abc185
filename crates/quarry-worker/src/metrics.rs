//! Metrics collection for worker operations

/// Counters collected across ticks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerMetrics {
    /// Ticks that ran a batch (possibly empty)
    pub ticks: usize,

    /// Ticks skipped because extraction was disabled
    pub skipped_ticks: usize,

    /// Tick attempts dropped because another tick was still running
    pub overlapping_ticks: usize,

    /// Jobs claimed
    pub claimed: usize,

    /// Jobs that succeeded
    pub succeeded: usize,

    /// Failed attempts that left the job retryable
    pub failed: usize,

    /// Failed attempts that exhausted the job's budget
    pub canceled: usize,

    /// Jobs handed back unstarted because the breaker refused them
    pub deferred: usize,

    /// Failures caused by a rejected content reference
    pub storage_rejections: usize,

    /// Expired locks cleared by the sweep
    pub locks_released: usize,

    /// Post-success reconciliations that failed
    pub reconcile_failures: usize,

    /// Job tasks that panicked
    pub panics: usize,

    /// Outcomes dropped because another worker had reclaimed the job
    pub lost_leases: usize,

    /// Job bookkeeping writes that failed
    pub store_errors: usize,
}

impl WorkerMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Add another set of counters to this one
    pub fn merge(&mut self, other: &WorkerMetrics) {
        self.ticks += other.ticks;
        self.skipped_ticks += other.skipped_ticks;
        self.overlapping_ticks += other.overlapping_ticks;
        self.claimed += other.claimed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.canceled += other.canceled;
        self.deferred += other.deferred;
        self.storage_rejections += other.storage_rejections;
        self.locks_released += other.locks_released;
        self.reconcile_failures += other.reconcile_failures;
        self.panics += other.panics;
        self.lost_leases += other.lost_leases;
        self.store_errors += other.store_errors;
    }

    /// Jobs that reached an outcome (success, retry or cancel)
    pub fn total_processed(&self) -> usize {
        self.succeeded + self.failed + self.canceled
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Worker Metrics Summary".to_string(),
            "======================".to_string(),
            format!("Ticks: {}", self.ticks),
            format!("Skipped ticks (kill switch): {}", self.skipped_ticks),
            format!("Overlapping ticks: {}", self.overlapping_ticks),
            String::new(),
            format!("Claimed: {}", self.claimed),
            format!("Succeeded: {}", self.succeeded),
            format!("Failed (will retry): {}", self.failed),
            format!("Canceled: {}", self.canceled),
            format!("Deferred: {}", self.deferred),
            format!("Locks released: {}", self.locks_released),
        ];

        if self.storage_rejections > 0 {
            lines.push(format!("Storage rejections: {}", self.storage_rejections));
        }
        if self.reconcile_failures > 0 {
            lines.push(format!("Reconcile failures: {}", self.reconcile_failures));
        }
        if self.panics > 0 {
            lines.push(format!("Panicked jobs: {}", self.panics));
        }
        if self.lost_leases > 0 {
            lines.push(format!("Lost leases: {}", self.lost_leases));
        }
        if self.store_errors > 0 {
            lines.push(format!("Store errors: {}", self.store_errors));
        }

        lines.join("\n")
    }
}
