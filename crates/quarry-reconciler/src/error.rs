//! Reconciler error types

use quarry_domain::QuarryError;
use thiserror::Error;

/// Errors that can occur while reconciling a case
#[derive(Error, Debug)]
pub enum ReconcilerError {
    /// Loading observations or persisting the snapshot failed
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ReconcilerError> for QuarryError {
    fn from(e: ReconcilerError) -> Self {
        match e {
            ReconcilerError::Store(msg) => QuarryError::Store(msg),
            ReconcilerError::Config(msg) => QuarryError::Validation(msg),
        }
    }
}
