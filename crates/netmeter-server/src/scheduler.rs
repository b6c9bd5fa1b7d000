//! Background loops: collection + canonical regeneration, and snapshots.
//!
//! One worker per concern, all stopped through the same cancellation
//! token. Collection and aggregation hold the pause gate's read side;
//! snapshots and restores take the write side so the database file is
//! quiescent while it is copied or swapped.

use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use netmeter_backup::{prune_snapshots, restore_latest, snapshot_database};
use netmeter_report::{AggregateContext, Period, aggregate};
use netmeter_store::check_database;

use crate::collector::{RouterSource, collect_cycle};
use crate::error::ServerError;
use crate::state::AppState;

/// The rolling artifacts refreshed every cycle.
pub const CANONICAL_PERIODS: [Period; 5] = [
    Period::Today,
    Period::Yesterday,
    Period::LastSevenDays,
    Period::CurrentMonth,
    Period::AllTime,
];

/// The calendar month before `today`, which became immutable when it
/// ended.
pub fn previous_month(today: NaiveDate) -> Period {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };
    Period::Month { year, month }
}

/// Regenerate every canonical artifact, plus the previous month's exactly
/// once. Completed months are never rewritten: their artifact either
/// exists and is final, or is generated now and final from then on.
pub async fn regenerate_canonical(state: &AppState) -> Result<(), ServerError> {
    let ctx = AggregateContext::new(state.config.quota, state.config.report);

    for period in CANONICAL_PERIODS {
        let report = aggregate(&state.store, &period, &ctx).await?;
        state.cache.store(&period.key(), &report).await?;
    }

    let last_month = previous_month(ctx.today);
    if last_month.is_completed_month(ctx.today) && !state.cache.contains(&last_month.key()) {
        let report = aggregate(&state.store, &last_month, &ctx).await?;
        state.cache.store(&last_month.key(), &report).await?;
        info!(key = last_month.key(), "completed month sealed");
    }
    Ok(())
}

/// Collection loop: integrity gate, one collection cycle, canonical
/// regeneration. Failures cost the current tick only.
pub async fn run_collection_loop(
    state: AppState,
    source: Option<Arc<dyn RouterSource>>,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(Duration::from_secs(state.config.collector.interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => {
                info!("collection loop stopped");
                return;
            }
        }

        if state.config.backup.self_heal {
            if let Err(e) = heal_if_corrupt(&state).await {
                error!(error = %e, "self-heal failed, retrying next cycle");
                continue;
            }
        }

        if let Some(source) = &source {
            let _hold = state.gate.read().await;
            let now_ts = Local::now().timestamp();
            if let Err(e) = collect_cycle(&state.store, source.as_ref(), now_ts).await {
                warn!(error = %e, "collection cycle failed");
            }
        }

        let _hold = state.gate.read().await;
        if let Err(e) = regenerate_canonical(&state).await {
            warn!(error = %e, "canonical regeneration failed");
        }
    }
}

/// Check the database file; on corruption, pause everything and swap in
/// the newest usable snapshot, then reconnect the live pool.
async fn heal_if_corrupt(state: &AppState) -> Result<(), ServerError> {
    let Some(db) = state.store.path().map(|p| p.to_path_buf()) else {
        return Ok(());
    };
    if check_database(&db).await.is_ok() {
        return Ok(());
    }
    error!(db = %db.display(), "counter store failed integrity check");

    let _hold = state.gate.write().await;
    state.store.close().await;
    let status = restore_latest(
        &db,
        &state.config.paths.backup_dir(),
        &state.config.paths.data_dir,
    )
    .await?;
    state.store.reopen().await?;
    info!(source = status.source, "counter store restored");
    Ok(())
}

/// Snapshot loop: compress the database daily and prune beyond retention.
pub async fn run_backup_loop(state: AppState, shutdown: CancellationToken) {
    let mut ticker = interval(Duration::from_secs(state.config.backup.interval_secs));
    // The first tick fires immediately; skip it so startup isn't spent
    // compressing the database.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => {
                info!("backup loop stopped");
                return;
            }
        }

        let Some(db) = state.store.path().map(|p| p.to_path_buf()) else {
            continue;
        };
        let backup_dir = state.config.paths.backup_dir();
        let retention = state.config.backup.retention;

        // Exclusive hold: the file must not change under the compressor,
        // and the WAL has to be folded in so the main file stands alone.
        let _hold = state.gate.write().await;
        if let Err(e) = state.store.checkpoint().await {
            warn!(error = %e, "wal checkpoint failed, skipping snapshot");
            continue;
        }
        let result = tokio::task::spawn_blocking(move || {
            snapshot_database(&db, &backup_dir)?;
            prune_snapshots(&backup_dir, retention)
        })
        .await;
        match result {
            Ok(Ok(pruned)) if pruned > 0 => info!(pruned, "old snapshots pruned"),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "scheduled snapshot failed"),
            Err(e) => warn!(error = %e, "snapshot task panicked"),
        }
    }
}
