//! Report pipeline error types.

use thiserror::Error;

/// Errors from aggregation and the report cache.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Malformed or inverted date range; rejected synchronously, no
    /// partial report is produced.
    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    /// Unknown artifact key.
    #[error("unknown report key: {0}")]
    UnknownKey(String),

    /// Counter store failure during aggregation.
    #[error(transparent)]
    Store(#[from] netmeter_store::StoreError),

    /// Artifact write/read failure. The previous artifact stays intact.
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact serialization failure.
    #[error("artifact encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
