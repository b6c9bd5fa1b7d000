//! Report schema, as serialized into cache artifacts.

use serde::{Deserialize, Serialize};

/// Anomaly sentinel: "high usage, no ratio available". Used for single-day
/// threshold breaches and for brand-new devices with no history to average
/// over, so they are never silently treated as normal.
pub const ANOMALY_SENTINEL: f64 = 999.0;

/// Quota ceiling class applied to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaType {
    Daily,
    Weekly,
    Monthly,
}

/// The aggregation result for one period. Immutable once written; the
/// dashboard consumes it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Boundary dates, `YYYY-MM-DD`.
    pub start: String,
    pub end: String,
    pub stats: ReportStats,
    /// Ranked descending by total bytes.
    pub devices: Vec<DeviceReport>,
    pub chart: ChartSeries,
    /// Overall top applications, ranked descending.
    pub top_apps: Vec<AppUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    pub dl_bytes: u64,
    pub ul_bytes: u64,
    pub total_bytes: u64,
    pub device_count: usize,
    pub quota_gb: u64,
    pub quota_type: QuotaType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub mac: String,
    pub name: String,
    pub dl_bytes: u64,
    pub ul_bytes: u64,
    pub total_bytes: u64,
    /// Share of the period total; all shares sum to 100 (± rounding), or
    /// are all 0 when the period total is 0.
    pub percentage: f64,
    /// Per-day totals aligned with `chart.labels`.
    pub daily_bytes: Vec<u64>,
    pub avg_daily_gb: f64,
    pub peak_day: PeakDay,
    /// Most recent day vs. per-day average, in percent, or
    /// [`ANOMALY_SENTINEL`].
    pub recent_vs_avg_percent: f64,
    pub high_usage: bool,
    /// This device's top applications over the period.
    pub top_apps: Vec<AppUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakDay {
    pub date: String,
    pub gb: f64,
}

/// Bar-chart-ready series: one bucket per calendar day, plus an hourly
/// breakdown (24 buckets) for single-day periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values_bytes: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly_values_bytes: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly_labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppUsage {
    pub name: String,
    pub total_bytes: u64,
}

/// Bytes to gigabytes, rounded to two decimals (dashboard display unit).
pub(crate) fn bytes_to_gb(bytes: u64) -> f64 {
    (bytes as f64 / 1_073_741_824.0 * 100.0).round() / 100.0
}
