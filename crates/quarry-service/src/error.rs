//! Error types for the service facade

use quarry_domain::QuarryError;
use quarry_reconciler::ReconcilerError;
use thiserror::Error;

/// Errors returned by [`crate::ExtractionService`]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A domain refusal or failure (not found, circuit open, retry refused, store)
    #[error(transparent)]
    Quarry(#[from] QuarryError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Convert any store error through the domain taxonomy
    pub(crate) fn store<E: Into<QuarryError>>(e: E) -> Self {
        ServiceError::Quarry(e.into())
    }

    /// The domain error, if this is one
    pub fn as_quarry(&self) -> Option<&QuarryError> {
        match self {
            ServiceError::Quarry(e) => Some(e),
            ServiceError::Config(_) => None,
        }
    }

    /// Whether the caller may succeed by trying again later
    pub fn is_retryable_later(&self) -> bool {
        self.as_quarry().is_some_and(QuarryError::is_retryable_later)
    }
}

impl From<ReconcilerError> for ServiceError {
    fn from(e: ReconcilerError) -> Self {
        ServiceError::Quarry(e.into())
    }
}
