//! History import from a foreign counter dataset.
//!
//! The router keeps its own long-term accounting store; on first install
//! (or after data loss) its history can be merged into the local ledger.
//! Live-collected data always wins: only time ranges outside the local
//! coverage are imported, overlapping timestamps are dropped.

use sqlx::Row;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::CounterStore;

/// A sample row from a foreign dataset, not yet part of the ledger.
#[derive(Debug, Clone)]
pub struct ExternalSample {
    pub mac: String,
    pub ts: i64,
    pub dl_cum: u64,
    pub ul_cum: u64,
}

impl CounterStore {
    /// Merge foreign samples into the ledger. Returns the number of rows
    /// imported.
    ///
    /// Rows older than the local coverage are assigned sequence numbers
    /// below every existing row, so reconciliation by recorded order still
    /// walks them in chronological position instead of pairing years-old
    /// counters against the latest live sample.
    pub async fn import_history(
        &self,
        samples: &[ExternalSample],
    ) -> Result<u64, StoreError> {
        if samples.is_empty() {
            return Ok(0);
        }

        let coverage = self.coverage().await?;
        let mut sorted: Vec<&ExternalSample> = samples.iter().collect();
        sorted.sort_by_key(|s| s.ts);

        let (older, newer): (Vec<&ExternalSample>, Vec<&ExternalSample>) = match coverage {
            Some((local_min, local_max)) => {
                let batch_min = sorted.first().map(|s| s.ts).unwrap_or(0);
                let batch_max = sorted.last().map(|s| s.ts).unwrap_or(0);
                if batch_min >= local_min && batch_max <= local_max {
                    info!(
                        batch_min,
                        batch_max, "local data already covers import range, skipping"
                    );
                    return Ok(0);
                }
                sorted
                    .into_iter()
                    .filter(|s| s.ts < local_min || s.ts > local_max)
                    .partition(|s| s.ts < local_min)
            }
            None => (Vec::new(), sorted),
        };

        let mut imported = 0u64;
        let mut tx = self.pool().begin().await?;

        if !older.is_empty() {
            let row = sqlx::query("SELECT MIN(seq) FROM counter_samples")
                .fetch_one(&mut *tx)
                .await?;
            let min_seq: i64 = row.try_get::<Option<i64>, _>(0)?.unwrap_or(1);
            let mut seq = min_seq - older.len() as i64;
            for s in &older {
                sqlx::query(
                    "INSERT INTO counter_samples (seq, mac, ts, dl_cum, ul_cum) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(seq)
                .bind(&s.mac)
                .bind(s.ts)
                .bind(s.dl_cum as i64)
                .bind(s.ul_cum as i64)
                .execute(&mut *tx)
                .await?;
                seq += 1;
                imported += 1;
            }
        }

        for s in &newer {
            sqlx::query("INSERT INTO counter_samples (mac, ts, dl_cum, ul_cum) VALUES (?, ?, ?, ?)")
                .bind(&s.mac)
                .bind(s.ts)
                .bind(s.dl_cum as i64)
                .bind(s.ul_cum as i64)
                .execute(&mut *tx)
                .await?;
            imported += 1;
        }

        tx.commit().await?;
        debug!(imported, "history import complete");
        Ok(imported)
    }
}
