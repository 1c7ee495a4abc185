//! Error types for the CLI application.

use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Service operation refused or failed
    #[error(transparent)]
    Service(#[from] quarry_service::ServiceError),

    /// Database error
    #[error("Store error: {0}")]
    Store(#[from] quarry_store::StoreError),

    /// Worker error
    #[error("Worker error: {0}")]
    Worker(#[from] quarry_worker::WorkerError),

    /// Provider could not be built
    #[error("Provider error: {0}")]
    Provider(#[from] quarry_domain::ProviderError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Nothing recorded for the requested document
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
