//! Backup and self-healing restore for the counter store.
//!
//! Three layers: scheduled gzip snapshots with checksum sidecars and
//! bounded retention, operator-driven tar.gz archives covering the store
//! plus the report cache and config, and an integrity gate that restores
//! the newest verifiable snapshot when the live database goes bad.

mod archive;
mod error;
mod restore;
mod snapshot;

#[cfg(test)]
mod tests;

pub use archive::{ArchivePaths, create_archive, restore_archive};
pub use error::BackupError;
pub use restore::{
    RestoreStatus, clear_restore_marker, ensure_healthy, read_restore_marker, restore_latest,
};
pub use snapshot::{list_snapshots, prune_snapshots, snapshot_database, verify_checksum};
