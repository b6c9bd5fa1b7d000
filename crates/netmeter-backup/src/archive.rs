//! Manual archives: one tar.gz holding the counter store, the report
//! cache, and the active config file.
//!
//! Archives are for migrations and operator-driven disaster recovery;
//! unlike scheduled snapshots they are never pruned automatically.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Local;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{info, warn};

use netmeter_store::check_database;

use crate::error::BackupError;
use crate::restore::RestoreStatus;

const ARCHIVE_PREFIX: &str = "netmeter-";
const ARCHIVE_SUFFIX: &str = ".tar.gz";
const DB_ENTRY: &str = "counters.db";
const REPORTS_ENTRY: &str = "reports";
const CONFIG_ENTRY: &str = "config";

/// What goes into (and comes out of) a manual archive.
pub struct ArchivePaths<'a> {
    pub db: &'a Path,
    pub report_dir: &'a Path,
    pub config_file: Option<&'a Path>,
}

/// Build a timestamped archive under `archive_dir` and return its path.
/// As with snapshots, a live WAL-mode database must be checkpointed
/// before its file is archived.
pub fn create_archive(
    paths: &ArchivePaths<'_>,
    archive_dir: &Path,
) -> Result<PathBuf, BackupError> {
    fs::create_dir_all(archive_dir)?;
    let tag = Local::now().format("%Y%m%d_%H%M%S");
    let archive = archive_dir.join(format!("{ARCHIVE_PREFIX}{tag}{ARCHIVE_SUFFIX}"));
    let tmp = archive.with_extension("gz.tmp");

    let result = (|| -> Result<(), BackupError> {
        let encoder = GzEncoder::new(File::create(&tmp)?, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_path_with_name(paths.db, DB_ENTRY)?;
        if paths.report_dir.is_dir() {
            builder.append_dir_all(REPORTS_ENTRY, paths.report_dir)?;
        }
        if let Some(config) = paths.config_file {
            let name = config
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "config".to_string());
            builder.append_path_with_name(config, format!("{CONFIG_ENTRY}/{name}"))?;
        }
        builder.into_inner()?.finish()?.sync_all()?;
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, &archive)?;

    info!(archive = %archive.display(), "manual archive created");
    Ok(archive)
}

/// Restore the counter store and report cache from a manual archive.
///
/// All-or-nothing: the archive is unpacked into a staging directory and
/// its database verified before anything live is touched; the current
/// database and report cache are set aside, not deleted. Returns a restore
/// event recording the swap.
pub async fn restore_archive(
    archive: &Path,
    db: &Path,
    report_dir: &Path,
    data_dir: &Path,
) -> Result<RestoreStatus, BackupError> {
    let detected_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    fs::create_dir_all(data_dir)?;
    let staging = data_dir.join(".restore-staging");
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }

    let unpack = (|| -> Result<(), BackupError> {
        let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive)?));
        tar.unpack(&staging)?;
        Ok(())
    })();
    if let Err(e) = unpack {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    let staged_db = staging.join(DB_ENTRY);
    if !staged_db.exists() {
        let _ = fs::remove_dir_all(&staging);
        return Err(BackupError::BadArchive(format!(
            "missing {DB_ENTRY} entry in {}",
            archive.display()
        )));
    }
    if let Err(e) = check_database(&staged_db).await {
        let _ = fs::remove_dir_all(&staging);
        return Err(e.into());
    }

    // Verified; swap the live files out.
    let tag = Local::now().format("%Y%m%d_%H%M%S");
    if db.exists() {
        let mut aside = db.as_os_str().to_os_string();
        aside.push(format!(".pre-restore.{tag}"));
        fs::rename(db, PathBuf::from(aside))?;
    }
    for suffix in ["-wal", "-shm"] {
        let mut name = db.as_os_str().to_os_string();
        name.push(suffix);
        let _ = fs::remove_file(PathBuf::from(name));
    }
    fs::rename(&staged_db, db)?;

    let staged_reports = staging.join(REPORTS_ENTRY);
    if staged_reports.is_dir() {
        if report_dir.exists() {
            let mut aside = report_dir.as_os_str().to_os_string();
            aside.push(format!(".pre-restore.{tag}"));
            fs::rename(report_dir, PathBuf::from(aside))?;
        }
        fs::rename(&staged_reports, report_dir)?;
    } else {
        warn!(archive = %archive.display(), "archive carries no report cache");
    }
    let _ = fs::remove_dir_all(&staging);

    let status = RestoreStatus {
        detected_at,
        restored_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        source: archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    info!(source = %status.source, "restored from manual archive");
    Ok(status)
}
