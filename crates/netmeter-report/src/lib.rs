//! Period aggregation and report artifacts.
//!
//! This crate turns the reconciled deltas of the counter store into the
//! report artifacts the dashboard consumes: per-device totals and shares,
//! application breakdowns, chart-ready time series, and quota/anomaly
//! signals. Canonical periods are cached as named JSON artifacts written
//! with a generate-then-swap; custom ranges run through a job queue.

mod aggregate;
mod cache;
mod error;
mod jobs;
mod period;
mod report;


pub use aggregate::{AggregateContext, aggregate};
pub use cache::ReportCache;
pub use error::ReportError;
pub use jobs::{CustomJob, JobStatus, JobStore, run_worker, wait_ready};
pub use period::{DateRange, Period, day_start_ts, select_quota, ts_to_date};
pub use report::{
    ANOMALY_SENTINEL, AppUsage, ChartSeries, DeviceReport, PeakDay, QuotaType, Report, ReportStats,
};
