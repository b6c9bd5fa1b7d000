//! Counter store error types.

use thiserror::Error;

/// Errors from the counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The database failed its integrity check.
    #[error("counter store is corrupt: {0}")]
    Corrupt(String),

    /// The database file does not exist.
    #[error("counter store missing: {0}")]
    Missing(String),
}
