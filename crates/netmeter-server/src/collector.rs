//! Sample collection.
//!
//! A [`RouterSource`] yields one cumulative reading per active device each
//! cycle; the collector appends them to the counter store. A source that
//! errors out (router rebooting, database locked mid-write) costs exactly
//! one interval: the cycle is skipped with a warning and the next one
//! retries from scratch.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{debug, warn};

use netmeter_store::CounterStore;

use crate::error::ServerError;

/// One device's cumulative counters as the router reports them.
#[derive(Debug, Clone)]
pub struct DeviceReading {
    pub mac: String,
    /// DHCP hostname or similar, when the source knows one.
    pub name_hint: Option<String>,
    pub dl_cum: u64,
    pub ul_cum: u64,
    /// Per-application cumulative combined bytes.
    pub apps: Vec<(String, u64)>,
}

/// Where counter readings come from. The production implementation reads
/// the router's traffic-accounting database; tests substitute a scripted
/// source.
#[async_trait]
pub trait RouterSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<DeviceReading>, ServerError>;
}

/// Reads the router's own traffic-accounting SQLite database.
///
/// The router appends interval rows per (mac, app); summing them per
/// device yields the cumulative counters this pipeline wants. The router
/// prunes its history on its own schedule, so the sums can go backwards —
/// that is exactly the counter-reset case reconciliation absorbs. Devices
/// quiet for longer than the activity window are left out of the reading.
pub struct RouterDbSource {
    path: PathBuf,
    activity_window_secs: i64,
}

const DEVICE_TOTALS: &str = "\
SELECT mac, SUM(rx) AS dl_cum, SUM(tx) AS ul_cum
FROM traffic
GROUP BY mac
HAVING MAX(timestamp) >= ?";

const APP_TOTALS: &str = "\
SELECT mac, app_name, SUM(rx + tx) AS total_cum
FROM traffic
GROUP BY mac, app_name
HAVING MAX(timestamp) >= ?";

impl RouterDbSource {
    pub fn new(path: impl Into<PathBuf>, activity_window_secs: u64) -> Self {
        Self {
            path: path.into(),
            activity_window_secs: activity_window_secs as i64,
        }
    }
}

#[async_trait]
impl RouterSource for RouterDbSource {
    async fn fetch(&self) -> Result<Vec<DeviceReading>, ServerError> {
        // One short-lived read-only connection per cycle; holding a pool
        // open against a database the router owns invites lock contention.
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| ServerError::Source(e.to_string()))?;

        let active_since = chrono::Local::now().timestamp() - self.activity_window_secs;
        let result = read_router_db(&pool, active_since).await;
        pool.close().await;
        result
    }
}

async fn read_router_db(
    pool: &sqlx::SqlitePool,
    active_since: i64,
) -> Result<Vec<DeviceReading>, ServerError> {
    let rows = sqlx::query(DEVICE_TOTALS)
        .bind(active_since)
        .fetch_all(pool)
        .await
        .map_err(|e| ServerError::Source(e.to_string()))?;

    let mut readings: Vec<DeviceReading> = rows
        .iter()
        .map(|r| DeviceReading {
            mac: r.get("mac"),
            name_hint: None,
            dl_cum: r.get::<i64, _>("dl_cum").max(0) as u64,
            ul_cum: r.get::<i64, _>("ul_cum").max(0) as u64,
            apps: Vec::new(),
        })
        .collect();

    let app_rows = sqlx::query(APP_TOTALS)
        .bind(active_since)
        .fetch_all(pool)
        .await
        .map_err(|e| ServerError::Source(e.to_string()))?;
    for row in &app_rows {
        let mac: String = row.get("mac");
        if let Some(reading) = readings.iter_mut().find(|d| d.mac == mac) {
            reading.push_app(
                row.get("app_name"),
                row.get::<i64, _>("total_cum").max(0) as u64,
            );
        }
    }
    Ok(readings)
}

impl DeviceReading {
    fn push_app(&mut self, app: String, total_cum: u64) {
        self.apps.push((app, total_cum));
    }
}

/// What one collection cycle did.
#[derive(Debug, Default)]
pub struct CycleStats {
    pub devices: usize,
    pub resets: usize,
}

/// Run one collection cycle: fetch a reading and append every counter.
///
/// A fetch failure skips the cycle (the next one retries); a failure while
/// recording is surfaced, since it means the local store is in trouble.
pub async fn collect_cycle(
    store: &CounterStore,
    source: &dyn RouterSource,
    now_ts: i64,
) -> Result<Option<CycleStats>, ServerError> {
    let readings = match source.fetch().await {
        Ok(readings) => readings,
        Err(e) => {
            warn!(error = %e, "router source unavailable, skipping cycle");
            return Ok(None);
        }
    };

    let mut stats = CycleStats::default();
    for reading in &readings {
        store
            .remember_device(&reading.mac, reading.name_hint.as_deref(), now_ts)
            .await?;
        let reset = store
            .record_sample(&reading.mac, now_ts, reading.dl_cum, reading.ul_cum)
            .await?;
        if reset.is_some() {
            stats.resets += 1;
        }
        for (app, total_cum) in &reading.apps {
            store
                .record_app_sample(&reading.mac, app, now_ts, *total_cum)
                .await?;
        }
        stats.devices += 1;
    }
    debug!(
        devices = stats.devices,
        resets = stats.resets,
        "collection cycle complete"
    );
    Ok(Some(stats))
}
