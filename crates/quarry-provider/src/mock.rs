//! Scripted provider for tests and dry runs

use async_trait::async_trait;
use quarry_domain::traits::ExtractionProvider;
use quarry_domain::{ExtractionOutput, ExtractionRequest, ProviderError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type Outcome = Result<ExtractionOutput, ProviderError>;

/// Mock extraction provider for deterministic testing
///
/// Returns pre-configured outcomes without any I/O. Outcomes can be queued per
/// file name; once a file's queue is drained the default outcome applies.
///
/// # Examples
///
/// ```
/// use quarry_provider::MockProvider;
/// use quarry_domain::ProviderError;
/// use serde_json::json;
///
/// let provider = MockProvider::new(json!({"tax_id": "12-3456789"}));
/// provider.add_error("broken.pdf", ProviderError::Failed("boom".into()));
/// assert_eq!(provider.call_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_outcome: Outcome,
    scripted: Arc<Mutex<HashMap<String, VecDeque<Outcome>>>>,
    delay: Option<Duration>,
    call_count: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockProvider {
    /// Provider that always succeeds with `structured` as its structured output
    pub fn new(structured: serde_json::Value) -> Self {
        Self::with_default(Ok(Self::output(structured)))
    }

    /// Provider that always fails with `error`
    pub fn failing(error: ProviderError) -> Self {
        Self::with_default(Err(error))
    }

    fn with_default(default_outcome: Outcome) -> Self {
        Self {
            default_outcome,
            scripted: Arc::new(Mutex::new(HashMap::new())),
            delay: None,
            call_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Successful output wrapping `structured`
    pub fn output(structured: serde_json::Value) -> ExtractionOutput {
        ExtractionOutput {
            text: structured.to_string(),
            structured_json: Some(structured),
            model: "mock-model".to_string(),
            provider: "mock".to_string(),
        }
    }

    /// Sleep this long inside every call (for timeout and overlap tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn scripted(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Outcome>>> {
        self.scripted.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a successful response for `file_name`
    pub fn add_response(&self, file_name: impl Into<String>, structured: serde_json::Value) {
        self.scripted()
            .entry(file_name.into())
            .or_default()
            .push_back(Ok(Self::output(structured)));
    }

    /// Queue a failure for `file_name`
    pub fn add_error(&self, file_name: impl Into<String>, error: ProviderError) {
        self.scripted()
            .entry(file_name.into())
            .or_default()
            .push_back(Err(error));
    }

    /// Number of extract calls so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Reset the call count
    pub fn reset_call_count(&self) {
        self.call_count.store(0, Ordering::SeqCst);
    }

    /// Highest number of calls observed running at the same time
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(serde_json::json!({}))
    }
}

#[async_trait]
impl ExtractionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionOutput, ProviderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted()
            .get_mut(&request.file_name)
            .and_then(|queue| queue.pop_front());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        scripted.unwrap_or_else(|| self.default_outcome.clone())
    }
}
