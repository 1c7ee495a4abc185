//! Error types for worker operations

use thiserror::Error;

/// Errors that can occur while running the extraction worker
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Storage layer error outside a single job (kill switch, sweep, claim)
    #[error("Storage error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
