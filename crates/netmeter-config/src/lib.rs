//! Configuration types and loading for the netmeter pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

mod cli;
mod defaults;
mod loader;
mod validate;

pub use cli::{CliOverrides, apply_overrides};
pub use loader::{ConfigError, load_config};
pub use validate::validate_config;

use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Filesystem layout. Everything lives under `data_dir` unless overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Counter store database file. Default: `<data_dir>/counters.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Report artifact directory. Default: `<data_dir>/reports`.
    #[serde(default)]
    pub report_dir: Option<PathBuf>,
    /// Scheduled snapshot directory. Default: `<data_dir>/backups`.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    /// Manual archive directory. Default: `<data_dir>/archives`.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
}

impl PathsConfig {
    pub fn database(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir.join("counters.db"))
    }

    pub fn report_dir(&self) -> PathBuf {
        self.report_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("reports"))
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("backups"))
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("archives"))
    }
}

/// Sample collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Seconds between counter polls.
    #[serde(default = "default_collect_interval_secs")]
    pub interval_secs: u64,
    /// Router traffic-accounting database, read-only. None disables collection
    /// (reports are still served from existing samples).
    #[serde(default)]
    pub router_db: Option<PathBuf>,
    /// Rolling window for history sync against the router store, in hours.
    #[serde(default = "default_sync_window_hours")]
    pub sync_window_hours: u64,
}

/// Quota ceilings, in gigabytes. Selected per report by period length.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_daily_quota_gb")]
    pub daily_gb: u64,
    #[serde(default = "default_weekly_quota_gb")]
    pub weekly_gb: u64,
    #[serde(default = "default_monthly_quota_gb")]
    pub monthly_gb: u64,
    /// Single-day per-device alert threshold (absolute GB).
    #[serde(default = "default_device_alert_gb")]
    pub device_alert_gb: f64,
}

/// Aggregation tuning knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Percent above the per-day average that flags a device as high usage.
    #[serde(default = "default_anomaly_threshold_percent")]
    pub anomaly_threshold_percent: f64,
    /// Devices below this many bytes are dropped from multi-day reports.
    #[serde(default = "default_min_device_bytes")]
    pub min_device_bytes: u64,
    /// Overall top application entries per report.
    #[serde(default = "default_top_apps")]
    pub top_apps: usize,
    /// Top application entries per device.
    #[serde(default = "default_device_top_apps")]
    pub device_top_apps: usize,
    /// Lookback window for single-day average/peak context, in days.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Minimum days of history before the lookback context is trusted.
    #[serde(default = "default_min_history_days")]
    pub min_history_days: usize,
    /// Seconds between polls while waiting for a custom report.
    #[serde(default = "default_job_poll_secs")]
    pub job_poll_secs: u64,
    /// Give up waiting for a custom report after this many seconds.
    #[serde(default = "default_job_wait_secs")]
    pub job_wait_secs: u64,
}

/// Snapshot schedule and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Seconds between scheduled snapshots.
    #[serde(default = "default_backup_interval_secs")]
    pub interval_secs: u64,
    /// Snapshots kept before the oldest is pruned.
    #[serde(default = "default_backup_retention")]
    pub retention: usize,
    /// Restore automatically when the counter store fails its integrity check.
    #[serde(default = "default_self_heal")]
    pub self_heal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address.
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_collect_interval_secs(),
            router_db: None,
            sync_window_hours: default_sync_window_hours(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_gb: default_daily_quota_gb(),
            weekly_gb: default_weekly_quota_gb(),
            monthly_gb: default_monthly_quota_gb(),
            device_alert_gb: default_device_alert_gb(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold_percent: default_anomaly_threshold_percent(),
            min_device_bytes: default_min_device_bytes(),
            top_apps: default_top_apps(),
            device_top_apps: default_device_top_apps(),
            lookback_days: default_lookback_days(),
            min_history_days: default_min_history_days(),
            job_poll_secs: default_job_poll_secs(),
            job_wait_secs: default_job_wait_secs(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_backup_interval_secs(),
            retention: default_backup_retention(),
            self_heal: default_self_heal(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}
