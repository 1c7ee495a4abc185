//! Error taxonomy
//!
//! [`QuarryError`] is what callers of the public APIs see. Collaborators report
//! their own errors ([`ProviderError`], [`StorageError`]); inside the worker those
//! are classified into a [`JobFailure`] and turned into job-state transitions
//! instead of being propagated.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the enqueue, status and administrative APIs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuarryError {
    /// Document or job absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed metadata or a request that cannot be honored in the current state
    #[error("Validation error: {0}")]
    Validation(String),

    /// MIME type extraction cannot handle
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// Extraction call failed or timed out
    #[error("Provider failure: {0}")]
    ProviderFailure(String),

    /// Disallowed content reference
    #[error("Storage rejected input: {0}")]
    StorageRejected(String),

    /// Attempt budget used up
    #[error("Retry exhausted after {attempts} of {max_attempts} attempts")]
    RetryExhausted {
        /// Attempts made so far
        attempts: u32,
        /// Attempt budget
        max_attempts: u32,
    },

    /// Backoff window still running
    #[error("Retry not allowed yet: backoff of {delay:?} has {remaining:?} remaining")]
    RetryBackoffNotElapsed {
        /// Full backoff delay for the current attempt
        delay: Duration,
        /// Time left before a retry is allowed
        remaining: Duration,
    },

    /// The job family's breaker is open; retry later
    #[error("Circuit '{name}' is open; retry in {retry_after:?}")]
    CircuitOpen {
        /// Breaker name
        name: String,
        /// Time until the breaker allows a probe
        retry_after: Duration,
    },

    /// The job was reclaimed by another worker (or finished) before this
    /// worker wrote its outcome
    #[error("Lease lost: {0}")]
    LeaseLost(String),

    /// Persistence layer failure
    #[error("Store error: {0}")]
    Store(String),
}

impl QuarryError {
    /// Whether waiting and retrying the same request may succeed
    pub fn is_retryable_later(&self) -> bool {
        matches!(
            self,
            QuarryError::CircuitOpen { .. }
                | QuarryError::RetryBackoffNotElapsed { .. }
                | QuarryError::ProviderFailure(_)
                | QuarryError::Store(_)
        )
    }
}

/// Errors reported by an extraction provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The provider cannot handle this MIME type
    #[error("Unsupported MIME type: {0}")]
    UnsupportedMimeType(String),

    /// The call did not finish in time
    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),

    /// The call failed (network, HTTP status, model error)
    #[error("Extraction failed: {0}")]
    Failed(String),

    /// The provider answered with something unusable
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Errors reported by the content storage collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Reference uses a disallowed scheme or escapes the storage root
    #[error("Rejected content reference '{reference}': {reason}")]
    Rejected {
        /// The offending reference
        reference: String,
        /// Why it was rejected
        reason: String,
    },

    /// Nothing stored under the reference
    #[error("Content not found: {0}")]
    NotFound(String),

    /// Underlying I/O failure
    #[error("Storage I/O error: {0}")]
    Io(String),
}

/// Classification of a failed job attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Document or version missing
    NotFound,
    /// Missing or malformed document metadata
    Validation,
    /// MIME type the provider cannot handle
    UnsupportedInput,
    /// Provider error or timeout
    ProviderFailure,
    /// Storage refused the content reference
    StorageRejected,
    /// Storage could not produce the bytes
    Storage,
    /// Persisting the result failed
    Store,
}

/// A failed attempt, ready to be written as job bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// What went wrong
    pub kind: FailureKind,
    /// Message stored in `last_error`
    pub message: String,
}

impl JobFailure {
    /// Create a failure of the given kind
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the failure should count against the provider's breaker
    pub fn counts_against_breaker(&self) -> bool {
        self.kind == FailureKind::ProviderFailure
    }

    /// Whether this is a security-relevant storage rejection
    pub fn is_storage_rejection(&self) -> bool {
        self.kind == FailureKind::StorageRejected
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<ProviderError> for JobFailure {
    fn from(e: ProviderError) -> Self {
        let kind = match e {
            ProviderError::UnsupportedMimeType(_) => FailureKind::UnsupportedInput,
            _ => FailureKind::ProviderFailure,
        };
        JobFailure::new(kind, e.to_string())
    }
}

impl From<StorageError> for JobFailure {
    fn from(e: StorageError) -> Self {
        let kind = match e {
            StorageError::Rejected { .. } => FailureKind::StorageRejected,
            StorageError::NotFound(_) => FailureKind::NotFound,
            StorageError::Io(_) => FailureKind::Storage,
        };
        JobFailure::new(kind, e.to_string())
    }
}

impl From<JobFailure> for QuarryError {
    fn from(f: JobFailure) -> Self {
        match f.kind {
            FailureKind::NotFound => QuarryError::NotFound(f.message),
            FailureKind::Validation => QuarryError::Validation(f.message),
            FailureKind::UnsupportedInput => QuarryError::UnsupportedInput(f.message),
            FailureKind::ProviderFailure => QuarryError::ProviderFailure(f.message),
            FailureKind::StorageRejected => QuarryError::StorageRejected(f.message),
            FailureKind::Storage | FailureKind::Store => QuarryError::Store(f.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_classification() {
        let timeout: JobFailure = ProviderError::Timeout(Duration::from_secs(5)).into();
        assert_eq!(timeout.kind, FailureKind::ProviderFailure);
        assert!(timeout.counts_against_breaker());

        let mime: JobFailure = ProviderError::UnsupportedMimeType("image/x-foo".into()).into();
        assert_eq!(mime.kind, FailureKind::UnsupportedInput);
        assert!(!mime.counts_against_breaker());
    }

    #[test]
    fn test_storage_rejection_classification() {
        let failure: JobFailure = StorageError::Rejected {
            reference: "http://evil".into(),
            reason: "scheme not allowed".into(),
        }
        .into();
        assert!(failure.is_storage_rejection());
        assert!(matches!(QuarryError::from(failure), QuarryError::StorageRejected(_)));
    }

    #[test]
    fn test_retryable_later() {
        let open = QuarryError::CircuitOpen {
            name: "extraction".into(),
            retry_after: Duration::from_secs(3),
        };
        assert!(open.is_retryable_later());
        assert!(!QuarryError::RetryExhausted { attempts: 3, max_attempts: 3 }.is_retryable_later());
        assert!(!QuarryError::Validation("bad".into()).is_retryable_later());
        assert!(!QuarryError::LeaseLost("job 7".into()).is_retryable_later());
    }
}
