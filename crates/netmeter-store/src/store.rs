//! SQLite-backed counter store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::queries;
use crate::sample::{CounterSample, TrafficDelta, reconcile, reconcile_single};

/// A reconciled delta attributed to a device, stamped with the later
/// sample's timestamp.
#[derive(Debug, Clone)]
pub struct DeviceDelta {
    pub mac: String,
    pub ts: i64,
    pub delta: TrafficDelta,
}

/// A reconciled per-application delta (combined bytes, single counter).
#[derive(Debug, Clone)]
pub struct AppDelta {
    pub mac: String,
    pub app: String,
    pub ts: i64,
    pub bytes: u64,
}

/// Device identity row.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub mac: String,
    pub name: String,
    /// True when the name was set explicitly by the user and must not be
    /// overwritten by DHCP hints.
    pub custom: bool,
    pub first_seen: i64,
    pub last_seen: i64,
}

/// Diagnostic marker for a detected counter reset.
#[derive(Debug, Clone)]
pub struct ResetEvent {
    pub mac: String,
    pub ts: i64,
    pub prev_dl: u64,
    pub prev_ul: u64,
    pub next_dl: u64,
    pub next_ul: u64,
}

/// Append-only ledger of cumulative counter samples.
///
/// Samples are never updated in place and never pruned; reports are always
/// recomputed from the ledger. WAL mode keeps concurrent reads from
/// blocking the single periodic writer.
pub struct CounterStore {
    /// Swapped out by [`CounterStore::reopen`] after a restore replaces the
    /// backing file; everything else takes a cheap cloned handle.
    pool: RwLock<SqlitePool>,
    path: Option<PathBuf>,
}

impl CounterStore {
    /// Open (or create) the store at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self {
            pool: RwLock::new(pool),
            path: Some(path),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store (tests and dry runs).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self {
            pool: RwLock::new(pool),
            path: None,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let db = self.pool();
        sqlx::raw_sql(queries::CREATE_SCHEMA).execute(&db).await?;
        Ok(())
    }

    /// Cloned pool handle (pools are internally reference-counted).
    pub fn pool(&self) -> SqlitePool {
        self.pool.read().clone()
    }

    /// Database file path (None for in-memory stores).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the pool. Required before the backing file is swapped out by
    /// a restore.
    pub async fn close(&self) {
        self.pool().close().await;
    }

    /// Reconnect to the backing file after a restore replaced it. The old
    /// pool is closed once the replacement is live; in-memory stores have
    /// nothing to reopen.
    pub async fn reopen(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let new_pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let old = std::mem::replace(&mut *self.pool.write(), new_pool);
        old.close().await;
        self.init_schema().await?;
        Ok(())
    }

    /// Fold the WAL back into the main database file. Until this runs,
    /// recent appends live only in `-wal`; anything copying the file on
    /// its own must checkpoint first.
    pub async fn checkpoint(&self) -> Result<(), StoreError> {
        let db = self.pool();
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&db)
            .await?;
        Ok(())
    }

    /// Append a raw counter sample. Returns the reset event when the new
    /// sample's counters went backwards against the most recent prior
    /// sample for the same device.
    pub async fn record_sample(
        &self,
        mac: &str,
        ts: i64,
        dl_cum: u64,
        ul_cum: u64,
    ) -> Result<Option<ResetEvent>, StoreError> {
        let prev = self.latest_sample(mac).await?;

        let db = self.pool();
        sqlx::query(queries::INSERT_SAMPLE)
            .bind(mac)
            .bind(ts)
            .bind(dl_cum as i64)
            .bind(ul_cum as i64)
            .execute(&db)
            .await?;

        let Some(prev) = prev else {
            debug!(mac, "first sample for device");
            return Ok(None);
        };

        let next = CounterSample {
            seq: 0,
            mac: mac.to_string(),
            ts,
            dl_cum,
            ul_cum,
        };
        if !reconcile(&prev, &next).reset {
            return Ok(None);
        }

        let event = ResetEvent {
            mac: mac.to_string(),
            ts,
            prev_dl: prev.dl_cum,
            prev_ul: prev.ul_cum,
            next_dl: dl_cum,
            next_ul: ul_cum,
        };
        sqlx::query(queries::INSERT_RESET_EVENT)
            .bind(&event.mac)
            .bind(event.ts)
            .bind(event.prev_dl as i64)
            .bind(event.prev_ul as i64)
            .bind(event.next_dl as i64)
            .bind(event.next_ul as i64)
            .execute(&db)
            .await?;
        warn!(
            mac,
            prev_dl = event.prev_dl,
            next_dl = event.next_dl,
            "counter reset detected"
        );
        Ok(Some(event))
    }

    /// Append a per-application cumulative sample.
    pub async fn record_app_sample(
        &self,
        mac: &str,
        app: &str,
        ts: i64,
        total_cum: u64,
    ) -> Result<(), StoreError> {
        let db = self.pool();
        sqlx::query(queries::INSERT_APP_SAMPLE)
            .bind(mac)
            .bind(app)
            .bind(ts)
            .bind(total_cum as i64)
            .execute(&db)
            .await?;
        Ok(())
    }

    /// Most recent sample for a device by recorded order.
    pub async fn latest_sample(&self, mac: &str) -> Result<Option<CounterSample>, StoreError> {
        let db = self.pool();
        let row = sqlx::query(queries::LATEST_SAMPLE_FOR_MAC)
            .bind(mac)
            .fetch_optional(&db)
            .await?;
        row.map(|r| sample_from_row(&r)).transpose()
    }

    /// Reconciled per-device deltas whose later sample falls in
    /// `[start_ts, end_ts)`.
    ///
    /// Samples before `start_ts` still participate as baselines so the
    /// first in-range sample reconciles against real history instead of
    /// being counted at face value.
    pub async fn deltas_in_range(
        &self,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<DeviceDelta>, StoreError> {
        let db = self.pool();
        let rows = sqlx::query(queries::SAMPLES_BEFORE)
            .bind(end_ts)
            .fetch_all(&db)
            .await?;

        let mut deltas = Vec::new();
        let mut prev: Option<CounterSample> = None;
        for row in &rows {
            let sample = sample_from_row(row)?;
            if let Some(p) = &prev {
                if p.mac == sample.mac {
                    if sample.ts >= start_ts {
                        deltas.push(DeviceDelta {
                            mac: sample.mac.clone(),
                            ts: sample.ts,
                            delta: reconcile(p, &sample),
                        });
                    }
                    prev = Some(sample);
                    continue;
                }
            }
            // First recorded sample of a device has no baseline; its
            // absolute value is the traffic observed so far.
            if sample.ts >= start_ts {
                deltas.push(DeviceDelta {
                    mac: sample.mac.clone(),
                    ts: sample.ts,
                    delta: TrafficDelta {
                        dl: sample.dl_cum,
                        ul: sample.ul_cum,
                        reset: false,
                    },
                });
            }
            prev = Some(sample);
        }
        Ok(deltas)
    }

    /// Reconciled per-application deltas in `[start_ts, end_ts)`.
    pub async fn app_deltas_in_range(
        &self,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<AppDelta>, StoreError> {
        let db = self.pool();
        let rows = sqlx::query(queries::APP_SAMPLES_BEFORE)
            .bind(end_ts)
            .fetch_all(&db)
            .await?;

        let mut deltas = Vec::new();
        let mut prev: Option<(String, String, u64)> = None;
        for row in &rows {
            let mac: String = row.try_get("mac")?;
            let app: String = row.try_get("app")?;
            let ts: i64 = row.try_get("ts")?;
            let cum = row.try_get::<i64, _>("total_cum")? as u64;

            let bytes = match &prev {
                Some((p_mac, p_app, p_cum)) if *p_mac == mac && *p_app == app => {
                    reconcile_single(*p_cum, cum).0
                }
                _ => cum,
            };
            if ts >= start_ts && bytes > 0 {
                deltas.push(AppDelta {
                    mac: mac.clone(),
                    app: app.clone(),
                    ts,
                    bytes,
                });
            }
            prev = Some((mac, app, cum));
        }
        Ok(deltas)
    }

    /// Record or refresh a device identity. DHCP-derived hints never
    /// overwrite a user-assigned name.
    pub async fn remember_device(
        &self,
        mac: &str,
        name_hint: Option<&str>,
        seen_ts: i64,
    ) -> Result<(), StoreError> {
        let name = match name_hint {
            Some(hint) if !hint.trim().is_empty() && hint != "*" => hint.to_string(),
            _ => fallback_name(mac),
        };
        let db = self.pool();
        sqlx::query(queries::UPSERT_DEVICE)
            .bind(mac)
            .bind(&name)
            .bind(seen_ts)
            .bind(seen_ts)
            .execute(&db)
            .await?;
        Ok(())
    }

    /// User-assigned display name; sticks until set again.
    pub async fn set_device_name(&self, mac: &str, name: &str) -> Result<(), StoreError> {
        let db = self.pool();
        sqlx::query(queries::SET_DEVICE_NAME)
            .bind(name)
            .bind(mac)
            .execute(&db)
            .await?;
        Ok(())
    }

    /// All known devices.
    pub async fn devices(&self) -> Result<Vec<DeviceInfo>, StoreError> {
        let db = self.pool();
        let rows = sqlx::query(queries::SELECT_DEVICES)
            .fetch_all(&db)
            .await?;
        rows.iter().map(device_from_row).collect()
    }

    /// MAC to display name map, with `Device-XXXX` fallbacks for MACs that
    /// were sampled before any name was learned.
    pub async fn device_names(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self
            .devices()
            .await?
            .into_iter()
            .map(|d| (d.mac, d.name))
            .collect())
    }

    /// Most recent reset markers, newest first.
    pub async fn recent_resets(&self, limit: i64) -> Result<Vec<ResetEvent>, StoreError> {
        let db = self.pool();
        let rows = sqlx::query(queries::RECENT_RESETS)
            .bind(limit)
            .fetch_all(&db)
            .await?;
        rows.iter().map(reset_from_row).collect()
    }

    /// Earliest and latest sample timestamps, None when empty.
    pub async fn coverage(&self) -> Result<Option<(i64, i64)>, StoreError> {
        let db = self.pool();
        let row = sqlx::query(queries::COVERAGE).fetch_one(&db).await?;
        let min: Option<i64> = row.try_get(0)?;
        let max: Option<i64> = row.try_get(1)?;
        Ok(min.zip(max))
    }

    /// Run `PRAGMA quick_check` against the live pool.
    pub async fn integrity_check(&self) -> Result<(), StoreError> {
        let db = self.pool();
        let row = sqlx::query("PRAGMA quick_check")
            .fetch_one(&db)
            .await?;
        let verdict: String = row.try_get(0)?;
        if verdict == "ok" {
            Ok(())
        } else {
            Err(StoreError::Corrupt(verdict))
        }
    }
}

fn sample_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CounterSample, StoreError> {
    Ok(CounterSample {
        seq: row.try_get("seq")?,
        mac: row.try_get("mac")?,
        ts: row.try_get("ts")?,
        dl_cum: row.try_get::<i64, _>("dl_cum")? as u64,
        ul_cum: row.try_get::<i64, _>("ul_cum")? as u64,
    })
}

fn device_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DeviceInfo, StoreError> {
    Ok(DeviceInfo {
        mac: row.try_get("mac")?,
        name: row.try_get("name")?,
        custom: row.try_get::<i64, _>("custom")? != 0,
        first_seen: row.try_get("first_seen")?,
        last_seen: row.try_get("last_seen")?,
    })
}

fn reset_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResetEvent, StoreError> {
    Ok(ResetEvent {
        mac: row.try_get("mac")?,
        ts: row.try_get("ts")?,
        prev_dl: row.try_get::<i64, _>("prev_dl")? as u64,
        prev_ul: row.try_get::<i64, _>("prev_ul")? as u64,
        next_dl: row.try_get::<i64, _>("next_dl")? as u64,
        next_ul: row.try_get::<i64, _>("next_ul")? as u64,
    })
}

/// Generic display name from the MAC suffix, matching what the dashboard
/// shows before a real name is learned. Also used by the aggregator for
/// MACs that were sampled before any identity row existed.
pub fn fallback_name(mac: &str) -> String {
    let suffix: String = mac
        .chars()
        .rev()
        .take(5)
        .filter(|c| *c != ':')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("Device-{suffix}")
}

/// Validate a counter database file without a live store: the file must
/// exist, pass `PRAGMA quick_check`, and contain the sample table.
///
/// Used by the backup engine before each collection cycle and after a
/// restore, where the database may be arbitrarily damaged.
pub async fn check_database(path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(StoreError::Missing(path.display().to_string()));
    }

    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    let pool = match SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
    {
        Ok(pool) => pool,
        Err(e) => return Err(StoreError::Corrupt(e.to_string())),
    };

    let verdict = sqlx::query("PRAGMA quick_check")
        .fetch_one(&pool)
        .await
        .and_then(|row| row.try_get::<String, _>(0));
    match verdict {
        Ok(v) if v == "ok" => {}
        Ok(v) => {
            pool.close().await;
            return Err(StoreError::Corrupt(v));
        }
        Err(e) => {
            pool.close().await;
            return Err(StoreError::Corrupt(e.to_string()));
        }
    }

    let tables = sqlx::query(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'counter_samples'",
    )
    .fetch_one(&pool)
    .await
    .and_then(|row| row.try_get::<i64, _>(0));
    pool.close().await;

    match tables {
        Ok(1) => Ok(()),
        Ok(_) => Err(StoreError::Corrupt("counter_samples table missing".into())),
        Err(e) => Err(StoreError::Corrupt(e.to_string())),
    }
}
