//! CLI override definitions and application logic.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

#[derive(Debug, Clone, Parser, Default)]
pub struct CliOverrides {
    /// Override HTTP listen address, e.g. 0.0.0.0:8088
    #[arg(long)]
    pub listen: Option<String>,
    /// Override base data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Override router traffic-accounting database path
    #[arg(long)]
    pub router_db: Option<PathBuf>,
    /// Override collection interval (seconds)
    #[arg(long)]
    pub collect_interval_secs: Option<u64>,
    /// Override daily quota (GB)
    #[arg(long)]
    pub daily_quota_gb: Option<u64>,
    /// Override weekly quota (GB)
    #[arg(long)]
    pub weekly_quota_gb: Option<u64>,
    /// Override monthly quota (GB)
    #[arg(long)]
    pub monthly_quota_gb: Option<u64>,
    /// Override per-device single-day alert threshold (GB)
    #[arg(long)]
    pub device_alert_gb: Option<f64>,
    /// Override snapshot retention count
    #[arg(long)]
    pub backup_retention: Option<usize>,
    /// Disable automatic restore on corruption
    #[arg(long)]
    pub no_self_heal: bool,
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long)]
    pub log_level: Option<String>,
}

pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) {
    if let Some(v) = &overrides.listen {
        config.server.listen = v.clone();
    }
    if let Some(v) = &overrides.data_dir {
        config.paths.data_dir = v.clone();
    }
    if let Some(v) = &overrides.router_db {
        config.collector.router_db = Some(v.clone());
    }
    if let Some(v) = overrides.collect_interval_secs {
        config.collector.interval_secs = v;
    }
    if let Some(v) = overrides.daily_quota_gb {
        config.quota.daily_gb = v;
    }
    if let Some(v) = overrides.weekly_quota_gb {
        config.quota.weekly_gb = v;
    }
    if let Some(v) = overrides.monthly_quota_gb {
        config.quota.monthly_gb = v;
    }
    if let Some(v) = overrides.device_alert_gb {
        config.quota.device_alert_gb = v;
    }
    if let Some(v) = overrides.backup_retention {
        config.backup.retention = v;
    }
    if overrides.no_self_heal {
        config.backup.self_heal = false;
    }
    if let Some(v) = &overrides.log_level {
        config.logging.level = Some(v.clone());
    }
}
