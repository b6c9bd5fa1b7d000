//! Scheduled database snapshots.
//!
//! One gzip-compressed copy of the counter store per calendar day, with a
//! `.sha256` sidecar over the compressed bytes. Re-running on the same day
//! replaces that day's snapshot. Snapshot I/O is synchronous; callers on
//! the runtime wrap it in `spawn_blocking`.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::Local;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::BackupError;

const SNAPSHOT_PREFIX: &str = "counters_";
const SNAPSHOT_SUFFIX: &str = ".db.gz";

/// Compress the database file into `backup_dir`, write the checksum
/// sidecar, and return the snapshot path.
///
/// Only the main database file is copied. A live WAL-mode store must be
/// checkpointed (or closed) first, or the snapshot misses everything
/// still sitting in the `-wal` sidecar.
pub fn snapshot_database(db: &Path, backup_dir: &Path) -> Result<PathBuf, BackupError> {
    fs::create_dir_all(backup_dir)?;
    let date_tag = Local::now().format("%Y-%m-%d");
    let snapshot = backup_dir.join(format!("{SNAPSHOT_PREFIX}{date_tag}{SNAPSHOT_SUFFIX}"));
    let tmp = snapshot.with_extension("gz.tmp");

    let result = (|| -> Result<(), BackupError> {
        let mut src = File::open(db)?;
        let mut encoder = GzEncoder::new(File::create(&tmp)?, Compression::default());
        io::copy(&mut src, &mut encoder)?;
        encoder.finish()?.sync_all()?;
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, &snapshot)?;

    let digest = sha256_file(&snapshot)?;
    fs::write(checksum_path(&snapshot), format!("{digest}\n"))?;

    info!(snapshot = %snapshot.display(), "database snapshot written");
    Ok(snapshot)
}

/// Snapshots in `dir`, newest first. The date tag in the name orders them;
/// files without a matching checksum sidecar are still listed (the restore
/// path rejects them later).
pub fn list_snapshots(dir: &Path) -> Result<Vec<PathBuf>, BackupError> {
    let mut snapshots = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(snapshots),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(SNAPSHOT_SUFFIX) {
            snapshots.push(entry.path());
        }
    }
    snapshots.sort();
    snapshots.reverse();
    Ok(snapshots)
}

/// Delete the oldest snapshots (and their sidecars) beyond `retention`.
/// Returns how many were pruned.
pub fn prune_snapshots(dir: &Path, retention: usize) -> Result<usize, BackupError> {
    let snapshots = list_snapshots(dir)?;
    let mut pruned = 0;
    for snapshot in snapshots.iter().skip(retention) {
        fs::remove_file(snapshot)?;
        let _ = fs::remove_file(checksum_path(snapshot));
        debug!(snapshot = %snapshot.display(), "snapshot pruned");
        pruned += 1;
    }
    Ok(pruned)
}

/// Verify a snapshot against its `.sha256` sidecar.
pub fn verify_checksum(snapshot: &Path) -> Result<(), BackupError> {
    let recorded = fs::read_to_string(checksum_path(snapshot))?;
    let recorded = recorded.trim();
    let actual = sha256_file(snapshot)?;
    if recorded == actual {
        Ok(())
    } else {
        Err(BackupError::ChecksumMismatch(snapshot.to_path_buf()))
    }
}

pub(crate) fn checksum_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot.as_os_str().to_os_string();
    name.push(".sha256");
    PathBuf::from(name)
}

pub(crate) fn sha256_file(path: &Path) -> Result<String, BackupError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Decompress a snapshot to `dest`, replacing whatever is there.
pub(crate) fn decompress_to(snapshot: &Path, dest: &Path) -> Result<(), BackupError> {
    let mut decoder = flate2::read::GzDecoder::new(File::open(snapshot)?);
    let mut out = File::create(dest)?;
    io::copy(&mut decoder, &mut out)?;
    out.sync_all()?;
    Ok(())
}
