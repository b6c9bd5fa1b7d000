use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] netmeter_store::StoreError),

    #[error("checksum mismatch for {0}")]
    ChecksumMismatch(PathBuf),

    #[error("no usable snapshot found in {0}")]
    NoUsableSnapshot(PathBuf),

    #[error("not an archive produced by this tool: {0}")]
    BadArchive(String),
}
