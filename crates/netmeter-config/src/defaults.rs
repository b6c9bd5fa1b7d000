//! Default value functions for serde deserialization.

pub(crate) fn default_collect_interval_secs() -> u64 {
    300
}

pub(crate) fn default_sync_window_hours() -> u64 {
    48
}

pub(crate) fn default_daily_quota_gb() -> u64 {
    50
}

pub(crate) fn default_weekly_quota_gb() -> u64 {
    200
}

pub(crate) fn default_monthly_quota_gb() -> u64 {
    500
}

pub(crate) fn default_device_alert_gb() -> f64 {
    5.0
}

pub(crate) fn default_anomaly_threshold_percent() -> f64 {
    18.0
}

pub(crate) fn default_min_device_bytes() -> u64 {
    // ~5 MiB; below this a device is noise on multi-day views
    5_368_709
}

pub(crate) fn default_top_apps() -> usize {
    10
}

pub(crate) fn default_device_top_apps() -> usize {
    5
}

pub(crate) fn default_lookback_days() -> i64 {
    30
}

pub(crate) fn default_min_history_days() -> usize {
    7
}

pub(crate) fn default_job_poll_secs() -> u64 {
    2
}

pub(crate) fn default_job_wait_secs() -> u64 {
    60
}

pub(crate) fn default_backup_interval_secs() -> u64 {
    86_400
}

pub(crate) fn default_backup_retention() -> usize {
    60
}

pub(crate) fn default_self_heal() -> bool {
    true
}

pub(crate) fn default_listen() -> String {
    "0.0.0.0:8088".to_string()
}
