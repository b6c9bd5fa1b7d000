//! Period aggregation: reconciled deltas in, a report out.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};

use netmeter_config::{QuotaConfig, ReportConfig};
use netmeter_store::{CounterStore, fallback_name};

use crate::error::ReportError;
use crate::period::{DateRange, Period, ts_to_date};
use crate::report::{
    ANOMALY_SENTINEL, AppUsage, ChartSeries, DeviceReport, PeakDay, Report, ReportStats,
    bytes_to_gb,
};

/// Request-scoped aggregation inputs. Carried explicitly through the call
/// chain; there is no process-wide mutable state to consult.
#[derive(Debug, Clone)]
pub struct AggregateContext {
    pub quota: QuotaConfig,
    pub tuning: ReportConfig,
    /// The aggregation clock. Injected so tests and replays are
    /// deterministic.
    pub today: NaiveDate,
}

impl AggregateContext {
    pub fn new(quota: QuotaConfig, tuning: ReportConfig) -> Self {
        Self {
            quota,
            tuning,
            today: Local::now().date_naive(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

#[derive(Default)]
struct DeviceAcc {
    dl: u64,
    ul: u64,
    total: u64,
    daily: Vec<u64>,
}

/// Aggregate a period into a report.
///
/// Empty periods (no devices, or a range entirely before any collected
/// data) produce an empty-but-valid report, never an error; only malformed
/// ranges are rejected.
pub async fn aggregate(
    store: &CounterStore,
    period: &Period,
    ctx: &AggregateContext,
) -> Result<Report, ReportError> {
    let coverage_start = store
        .coverage()
        .await?
        .and_then(|(min, _)| ts_to_date(min));
    let range = period.resolve(ctx.today, coverage_start)?;
    let days = range.days() as usize;
    let single_day = range.is_single_day();
    let labels: Vec<String> = range.iter_days().map(|d| d.to_string()).collect();

    let start_ts = range.start_ts();
    let end_ts = range.end_ts();
    let deltas = store.deltas_in_range(start_ts, end_ts).await?;
    let names = store.device_names().await?;

    let mut day_totals = vec![0u64; days];
    let mut hour_totals = vec![0u64; 24];
    let mut accs: BTreeMap<String, DeviceAcc> = BTreeMap::new();

    for d in &deltas {
        let Some(date) = ts_to_date(d.ts) else {
            continue;
        };
        let idx = (date - range.start).num_days();
        if idx < 0 || idx as usize >= days {
            continue;
        }
        let idx = idx as usize;
        let bytes = d.delta.dl + d.delta.ul;

        let acc = accs.entry(d.mac.clone()).or_insert_with(|| DeviceAcc {
            daily: vec![0; days],
            ..Default::default()
        });
        acc.dl += d.delta.dl;
        acc.ul += d.delta.ul;
        acc.total += bytes;
        acc.daily[idx] += bytes;
        day_totals[idx] += bytes;

        if single_day {
            let hour = ((d.ts - start_ts) / 3600).clamp(0, 23) as usize;
            hour_totals[hour] += bytes;
        }
    }

    // Application attribution, keyed per device (generic protocol names
    // grouped) and overall (original names, as the dashboard shows them).
    let app_deltas = store.app_deltas_in_range(start_ts, end_ts).await?;
    let mut device_apps: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    let mut overall_apps: BTreeMap<String, u64> = BTreeMap::new();
    for a in &app_deltas {
        *device_apps
            .entry(a.mac.clone())
            .or_default()
            .entry(rename_app(&a.app).to_string())
            .or_insert(0) += a.bytes;
        *overall_apps.entry(a.app.clone()).or_insert(0) += a.bytes;
    }

    // Sub-significance devices are dropped from multi-day views; the
    // percentage base is the sum over *reported* devices so shares always
    // add up to 100 regardless of what was filtered.
    let included: Vec<(&String, &DeviceAcc)> = accs
        .iter()
        .filter(|(_, a)| a.total > 0 && (single_day || a.total >= ctx.tuning.min_device_bytes))
        .collect();
    let grand_total: u64 = included.iter().map(|(_, a)| a.total).sum();

    // Single-day anomaly context comes from a longer lookback so a new
    // report is judged against real history, not against itself.
    let lookback = if single_day {
        Some(lookback_history(store, &range, ctx).await?)
    } else {
        None
    };

    let mut devices = Vec::new();
    for (mac, acc) in included {
        let percentage = if grand_total > 0 {
            acc.total as f64 / grand_total as f64 * 100.0
        } else {
            0.0
        };

        let (avg_daily_gb, peak_day, recent_vs_avg_percent) = if single_day {
            single_day_signals(mac, acc, &range, ctx, lookback.as_ref())
        } else {
            multi_day_signals(acc, &range, &labels)
        };
        let high_usage = recent_vs_avg_percent > ctx.tuning.anomaly_threshold_percent;

        let top_apps = ranked_apps(
            device_apps.get(mac).cloned().unwrap_or_default(),
            ctx.tuning.device_top_apps,
        );

        devices.push(DeviceReport {
            mac: mac.clone(),
            name: names
                .get(mac)
                .cloned()
                .unwrap_or_else(|| fallback_name(mac)),
            dl_bytes: acc.dl,
            ul_bytes: acc.ul,
            total_bytes: acc.total,
            percentage,
            daily_bytes: acc.daily.clone(),
            avg_daily_gb,
            peak_day,
            recent_vs_avg_percent,
            high_usage,
            top_apps,
        });
    }
    devices.sort_by(|a, b| {
        b.total_bytes
            .cmp(&a.total_bytes)
            .then_with(|| a.mac.cmp(&b.mac))
    });

    let (quota_gb, quota_type) = crate::period::select_quota(&range, &ctx.quota);

    let chart = ChartSeries {
        labels,
        values_bytes: day_totals,
        hourly_values_bytes: single_day.then(|| hour_totals.clone()),
        hourly_labels: single_day.then(|| (1..=24).map(|h| format!("{h}h")).collect()),
    };

    Ok(Report {
        start: range.start.to_string(),
        end: range.end.to_string(),
        stats: ReportStats {
            dl_bytes: devices.iter().map(|d| d.dl_bytes).sum(),
            ul_bytes: devices.iter().map(|d| d.ul_bytes).sum(),
            total_bytes: grand_total,
            device_count: devices.len(),
            quota_gb,
            quota_type,
        },
        devices,
        chart,
        top_apps: ranked_apps(overall_apps, ctx.tuning.top_apps),
    })
}

/// Multi-day trend: average over the period's day count, most recent day
/// compared against it. Devices with at most one day of traffic have no
/// baseline and get the sentinel so they are surfaced, not hidden.
fn multi_day_signals(
    acc: &DeviceAcc,
    range: &DateRange,
    labels: &[String],
) -> (f64, PeakDay, f64) {
    let days = range.days() as f64;
    let avg_daily_gb = bytes_to_gb(acc.total) / days;

    let (peak_idx, peak_bytes) = acc
        .daily
        .iter()
        .enumerate()
        .max_by_key(|(_, b)| **b)
        .map(|(i, b)| (i, *b))
        .unwrap_or((0, 0));
    let peak_day = PeakDay {
        date: labels.get(peak_idx).cloned().unwrap_or_default(),
        gb: bytes_to_gb(peak_bytes),
    };

    let active_days = acc.daily.iter().filter(|b| **b > 0).count();
    if active_days <= 1 {
        return (avg_daily_gb, peak_day, ANOMALY_SENTINEL);
    }

    // Most recent day the device was actually active; trailing quiet days
    // would otherwise read as a permanent drop.
    let most_recent = acc
        .daily
        .iter()
        .rev()
        .find(|b| **b > 0)
        .copied()
        .unwrap_or(0) as f64;
    let avg_daily = acc.total as f64 / days;
    let percent = (most_recent - avg_daily) / avg_daily * 100.0;
    (avg_daily_gb, peak_day, percent)
}

/// Single-day signals: the anomaly check is an absolute GB threshold, and
/// the average/peak context comes from the lookback window when enough
/// history exists.
fn single_day_signals(
    mac: &str,
    acc: &DeviceAcc,
    range: &DateRange,
    ctx: &AggregateContext,
    lookback: Option<&LookbackHistory>,
) -> (f64, PeakDay, f64) {
    let day_gb = bytes_to_gb(acc.total);
    let anomaly = if day_gb > ctx.quota.device_alert_gb {
        ANOMALY_SENTINEL
    } else {
        0.0
    };

    // Fallback context: the day stands for itself.
    let mut avg_daily_gb = day_gb;
    let mut peak_day = PeakDay {
        date: range.start.to_string(),
        gb: day_gb,
    };

    if let Some(history) = lookback {
        if history.active_days >= ctx.tuning.min_history_days {
            if let Some(days) = history.per_device.get(mac) {
                let total: u64 = days.values().sum();
                if total > 0 {
                    avg_daily_gb = bytes_to_gb(total) / history.active_days as f64;
                    if let Some((date, bytes)) =
                        days.iter().max_by_key(|(date, b)| (**b, std::cmp::Reverse(*date)))
                    {
                        peak_day = PeakDay {
                            date: date.to_string(),
                            gb: bytes_to_gb(*bytes),
                        };
                    }
                }
            }
        }
    }

    (avg_daily_gb, peak_day, anomaly)
}

struct LookbackHistory {
    /// Days in the lookback window where any device saw traffic.
    active_days: usize,
    per_device: BTreeMap<String, BTreeMap<NaiveDate, u64>>,
}

async fn lookback_history(
    store: &CounterStore,
    range: &DateRange,
    ctx: &AggregateContext,
) -> Result<LookbackHistory, ReportError> {
    let lookback_start = range.start - chrono::Days::new(ctx.tuning.lookback_days as u64);
    let window = DateRange {
        start: lookback_start,
        end: range.end,
    };
    let deltas = store
        .deltas_in_range(window.start_ts(), window.end_ts())
        .await?;

    let mut per_device: BTreeMap<String, BTreeMap<NaiveDate, u64>> = BTreeMap::new();
    let mut active: std::collections::BTreeSet<NaiveDate> = Default::default();
    for d in &deltas {
        let bytes = d.delta.dl + d.delta.ul;
        if bytes == 0 {
            continue;
        }
        let Some(date) = ts_to_date(d.ts) else {
            continue;
        };
        active.insert(date);
        *per_device
            .entry(d.mac.clone())
            .or_default()
            .entry(date)
            .or_insert(0) += bytes;
    }
    Ok(LookbackHistory {
        active_days: active.len(),
        per_device,
    })
}

/// Rank an app byte map descending, ties broken by name for deterministic
/// artifacts, truncated to the configured top-N.
fn ranked_apps(apps: BTreeMap<String, u64>, top_n: usize) -> Vec<AppUsage> {
    let mut ranked: Vec<AppUsage> = apps
        .into_iter()
        .map(|(name, total_bytes)| AppUsage { name, total_bytes })
        .collect();
    ranked.sort_by(|a, b| {
        b.total_bytes
            .cmp(&a.total_bytes)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(top_n);
    ranked
}

/// Group generic transport-level names the router reports into a single
/// bucket; they say nothing about what the device was actually doing.
fn rename_app(app: &str) -> &str {
    match app {
        "QUIC" | "SSL/TLS" | "General" | "HTTP Protocol over TLS SSL" => "Other Sources",
        _ => app,
    }
}
