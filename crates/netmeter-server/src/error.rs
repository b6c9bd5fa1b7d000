//! Server error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] netmeter_config::ConfigError),

    #[error("store: {0}")]
    Store(#[from] netmeter_store::StoreError),

    #[error("report: {0}")]
    Report(#[from] netmeter_report::ReportError),

    #[error("backup: {0}")]
    Backup(#[from] netmeter_backup::BackupError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("router source: {0}")]
    Source(String),
}
