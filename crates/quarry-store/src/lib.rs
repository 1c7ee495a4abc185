//! Quarry Storage Layer
//!
//! Implements the store traits from `quarry-domain` on SQLite: extraction jobs,
//! results, field observations, insight snapshots, document versions,
//! operational flags and the audit log.
//!
//! # Claiming
//!
//! Several worker processes may share one database file. `claim_jobs` runs inside
//! a `BEGIN IMMEDIATE` transaction, so claimers take the database write lock one
//! at a time; each row is then flipped with a conditional `UPDATE` that re-checks
//! eligibility. `busy_timeout` makes contenders wait for the lock instead of
//! failing with `SQLITE_BUSY`.
//!
//! # Examples
//!
//! ```no_run
//! use quarry_store::SqliteStore;
//!
//! let store = SqliteStore::new(":memory:").unwrap();
//! // Store is now ready for job operations
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod content;
mod documents;
mod insights;
mod jobs;
mod ops;

pub use config::StoreConfig;
pub use content::LocalContentStorage;
pub use ops::EXTRACTION_DISABLED_FLAG;

use chrono::{DateTime, Utc};
use quarry_domain::QuarryError;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default lock timeout (10 minutes)
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 600;

/// Default time a connection waits for the write lock (5 seconds)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the row's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The claim an outcome was written under is no longer held
    #[error("Lease lost: {0}")]
    LeaseLost(String),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<StoreError> for QuarryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => QuarryError::NotFound(msg),
            StoreError::InvalidState(msg) => QuarryError::Validation(msg),
            StoreError::LeaseLost(msg) => QuarryError::LeaseLost(msg),
            other => QuarryError::Store(other.to_string()),
        }
    }
}

/// SQLite-based implementation of the Quarry store traits
///
/// # Thread Safety
///
/// SQLite connections are not thread-safe. Each thread (or process) opens its
/// own `SqliteStore`; async code shares one behind `Arc<Mutex<_>>`.
pub struct SqliteStore {
    conn: Connection,
    lock_timeout: chrono::Duration,
}

impl SqliteStore {
    /// Create a new SqliteStore with the given database path
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use quarry_store::SqliteStore;
    ///
    /// let store = SqliteStore::new("quarry.db").unwrap();
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
        let mut store = Self {
            conn,
            lock_timeout: chrono::Duration::seconds(DEFAULT_LOCK_TIMEOUT_SECS as i64),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open a store from configuration
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let store = Self::new(&config.path)?.with_lock_timeout(config.lock_timeout());
        store.conn.busy_timeout(config.busy_timeout())?;
        Ok(store)
    }

    /// Override the lock timeout
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = chrono::Duration::from_std(lock_timeout).unwrap_or(chrono::Duration::MAX);
        self
    }

    /// Initialize the database schema
    fn initialize_schema(&mut self) -> Result<(), StoreError> {
        let schema = include_str!("schema.sql");
        self.conn.execute_batch(schema)?;
        Ok(())
    }
}

/// Timestamp to storage representation
pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

/// Storage representation to timestamp, reported against column `idx`
pub(crate) fn from_millis(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
        conversion_error(
            idx,
            rusqlite::types::Type::Integer,
            StoreError::InvalidData(format!("Timestamp out of range: {}", ms)),
        )
    })
}

pub(crate) fn opt_from_millis(idx: usize, ms: Option<i64>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    ms.map(|ms| from_millis(idx, ms)).transpose()
}

pub(crate) fn conversion_error(
    idx: usize,
    ty: rusqlite::types::Type,
    e: StoreError,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}

pub(crate) fn json_column(idx: usize, raw: &str) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| conversion_error(idx, rusqlite::types::Type::Text, StoreError::Serialization(e)))
}
