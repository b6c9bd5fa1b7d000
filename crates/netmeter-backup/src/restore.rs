//! Corruption detection and snapshot restore.
//!
//! The counter store is checked before work that depends on it; when the
//! check fails and self-healing is on, the newest snapshot whose checksum
//! and integrity check both pass is restored. The damaged file is set
//! aside first, never deleted, and every restore leaves a marker the HTTP
//! layer surfaces until an operator acknowledges it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use netmeter_store::check_database;

use crate::error::BackupError;
use crate::snapshot::{decompress_to, list_snapshots, verify_checksum};

const MARKER_FILE: &str = "last_restore.txt";
const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Record of an automatic restore, persisted until acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreStatus {
    /// When the corruption was detected.
    pub detected_at: String,
    /// When the restore completed.
    pub restored_at: String,
    /// Snapshot file name the store was restored from.
    pub source: String,
}

fn marker_path(data_dir: &Path) -> PathBuf {
    data_dir.join(MARKER_FILE)
}

/// Read the persisted restore marker, if any. A malformed marker is
/// treated as absent.
pub fn read_restore_marker(data_dir: &Path) -> Option<RestoreStatus> {
    let content = fs::read_to_string(marker_path(data_dir)).ok()?;
    let mut parts = content.trim().splitn(3, '|');
    Some(RestoreStatus {
        detected_at: parts.next()?.to_string(),
        restored_at: parts.next()?.to_string(),
        source: parts.next()?.to_string(),
    })
}

/// Acknowledge and remove the restore marker. Returns whether one existed.
pub fn clear_restore_marker(data_dir: &Path) -> Result<bool, BackupError> {
    let path = marker_path(data_dir);
    if path.exists() {
        fs::remove_file(path)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

fn write_restore_marker(data_dir: &Path, status: &RestoreStatus) -> Result<(), BackupError> {
    fs::create_dir_all(data_dir)?;
    fs::write(
        marker_path(data_dir),
        format!(
            "{}|{}|{}",
            status.detected_at, status.restored_at, status.source
        ),
    )?;
    Ok(())
}

/// Move a damaged database out of the way instead of deleting it.
fn set_aside_corrupt(db: &Path) -> Result<Option<PathBuf>, BackupError> {
    if !db.exists() {
        return Ok(None);
    }
    let tag = Local::now().format("%Y%m%d_%H%M%S");
    let mut name = db.as_os_str().to_os_string();
    name.push(format!(".corrupted.{tag}"));
    let aside = PathBuf::from(name);
    fs::rename(db, &aside)?;
    warn!(aside = %aside.display(), "corrupt database set aside");
    Ok(Some(aside))
}

/// Restore the database from the newest usable snapshot.
///
/// Candidates are tried newest first; one that fails its checksum or whose
/// decompressed contents fail the integrity check is skipped with a
/// warning. The existing file (however damaged) is set aside only once a
/// verified replacement is staged, so a failed restore cannot make things
/// worse.
pub async fn restore_latest(
    db: &Path,
    backup_dir: &Path,
    data_dir: &Path,
) -> Result<RestoreStatus, BackupError> {
    let detected_at = Local::now().format(TIMESTAMP_FMT).to_string();
    let staged = db.with_extension("db.restore");

    let mut restored_from = None;
    for snapshot in list_snapshots(backup_dir)? {
        if let Err(e) = verify_checksum(&snapshot) {
            warn!(snapshot = %snapshot.display(), error = %e, "snapshot rejected");
            continue;
        }
        if let Err(e) = decompress_to(&snapshot, &staged) {
            warn!(snapshot = %snapshot.display(), error = %e, "snapshot unreadable");
            let _ = fs::remove_file(&staged);
            continue;
        }
        if let Err(e) = check_database(&staged).await {
            warn!(snapshot = %snapshot.display(), error = %e, "snapshot contents corrupt");
            let _ = fs::remove_file(&staged);
            continue;
        }
        restored_from = Some(snapshot);
        break;
    }

    let Some(snapshot) = restored_from else {
        error!(backup_dir = %backup_dir.display(), "no usable snapshot");
        return Err(BackupError::NoUsableSnapshot(backup_dir.to_path_buf()));
    };

    set_aside_corrupt(db)?;
    // WAL sidecars belong to the file being replaced.
    for suffix in ["-wal", "-shm"] {
        let mut name = db.as_os_str().to_os_string();
        name.push(suffix);
        let _ = fs::remove_file(PathBuf::from(name));
    }
    fs::rename(&staged, db)?;

    let status = RestoreStatus {
        detected_at,
        restored_at: Local::now().format(TIMESTAMP_FMT).to_string(),
        source: snapshot
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    write_restore_marker(data_dir, &status)?;
    info!(source = %status.source, "database restored from snapshot");
    Ok(status)
}

/// Check the database and, when self-healing is enabled, restore it from
/// the newest usable snapshot on failure.
///
/// Holds the pause gate's write side across the restore so collection and
/// aggregation are fully stopped while the file is swapped. Returns the
/// restore event when one happened.
pub async fn ensure_healthy(
    db: &Path,
    backup_dir: &Path,
    data_dir: &Path,
    self_heal: bool,
    gate: &RwLock<()>,
) -> Result<Option<RestoreStatus>, BackupError> {
    match check_database(db).await {
        Ok(()) => Ok(None),
        Err(e) if self_heal => {
            error!(db = %db.display(), error = %e, "counter store failed integrity check");
            let _hold = gate.write().await;
            let status = restore_latest(db, backup_dir, data_dir).await?;
            Ok(Some(status))
        }
        Err(e) => Err(e.into()),
    }
}
