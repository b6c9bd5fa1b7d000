//! Report artifact cache.
//!
//! One JSON file per period key. Writes go through a temporary sibling and
//! an atomic rename, so a failed generation can never tear the previously
//! published artifact. Rolling canonical artifacts are overwritten in place
//! each cycle; completed months are written once and left alone; custom
//! artifacts accumulate and are treated as disposable.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ReportError;
use crate::report::Report;

pub struct ReportCache {
    dir: PathBuf,
}

impl ReportCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<(), ReportError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn artifact_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Whether an artifact for the key has been published.
    pub fn contains(&self, key: &str) -> bool {
        self.artifact_path(key).exists()
    }

    /// Publish an artifact: write to a temporary sibling, then atomically
    /// rename over the canonical name.
    pub async fn store(&self, key: &str, report: &Report) -> Result<(), ReportError> {
        let bytes = serde_json::to_vec_pretty(report)?;
        let path = self.artifact_path(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));

        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(key, bytes = bytes.len(), "artifact published");
        Ok(())
    }

    /// Load a published artifact. Missing artifacts are `None`; an
    /// unreadable artifact is logged and also reported as `None` so the
    /// caller regenerates rather than serving garbage.
    pub async fn load(&self, key: &str) -> Result<Option<Report>, ReportError> {
        let path = self.artifact_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                warn!(key, error = %e, "unreadable artifact, treating as absent");
                Ok(None)
            }
        }
    }

    /// Raw artifact bytes, for serving without a decode/encode round trip.
    pub async fn load_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, ReportError> {
        match tokio::fs::read(self.artifact_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Completed months with a published artifact, newest first.
    pub async fn list_available_months(&self) -> Result<Vec<String>, ReportError> {
        let mut months = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(months),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_prefix("month-").and_then(|n| n.strip_suffix(".json")) {
                months.push(stem.to_string());
            }
        }
        months.sort();
        months.reverse();
        Ok(months)
    }
}
