//! Custom-report job queue.
//!
//! A custom range request enqueues work and returns immediately; the
//! requester polls until the artifact lands. Re-requesting the same range
//! is idempotent (an in-flight job is never doubled up) and there is no
//! cancel: an abandoned poll just stops polling, the job still completes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{RwLock, mpsc};
use tracing::{info, warn};

use netmeter_config::{QuotaConfig, ReportConfig};
use netmeter_store::CounterStore;

use crate::aggregate::{AggregateContext, aggregate};
use crate::cache::ReportCache;
use crate::period::Period;

/// A queued custom aggregation.
#[derive(Debug, Clone)]
pub struct CustomJob {
    pub period: Period,
}

/// Generation state of a custom artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Ready,
    Failed,
}

/// Status store keyed by artifact key, shared between the HTTP layer and
/// the aggregation worker.
pub struct JobStore {
    statuses: Mutex<HashMap<String, JobStatus>>,
    tx: mpsc::UnboundedSender<CustomJob>,
}

impl JobStore {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<CustomJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                statuses: Mutex::new(HashMap::new()),
                tx,
            }),
            rx,
        )
    }

    /// Enqueue generation for a period. Returns false when an identical
    /// request is already in flight.
    pub fn request(&self, period: Period) -> bool {
        let key = period.key();
        let mut statuses = self.statuses.lock();
        if statuses.get(&key) == Some(&JobStatus::Pending) {
            return false;
        }
        statuses.insert(key, JobStatus::Pending);
        // A send failure means the worker is gone during shutdown; the
        // Pending entry is harmless then.
        let _ = self.tx.send(CustomJob { period });
        true
    }

    pub fn status(&self, key: &str) -> Option<JobStatus> {
        self.statuses.lock().get(key).copied()
    }

    fn finish(&self, key: &str, status: JobStatus) {
        self.statuses.lock().insert(key.to_string(), status);
    }
}

/// Aggregation worker: drains the job queue one at a time. Holds the
/// pause gate's read side while touching the store and cache, so a restore
/// (which takes the write side) fully serializes against it.
pub async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<CustomJob>,
    store: Arc<CounterStore>,
    cache: Arc<ReportCache>,
    jobs: Arc<JobStore>,
    quota: QuotaConfig,
    tuning: ReportConfig,
    gate: Arc<RwLock<()>>,
) {
    while let Some(job) = rx.recv().await {
        let key = job.period.key();
        let _hold = gate.read().await;
        let ctx = AggregateContext::new(quota, tuning);
        match aggregate(&store, &job.period, &ctx).await {
            Ok(report) => match cache.store(&key, &report).await {
                Ok(()) => {
                    info!(key, "custom report generated");
                    jobs.finish(&key, JobStatus::Ready);
                }
                Err(e) => {
                    warn!(key, error = %e, "failed to publish custom report");
                    jobs.finish(&key, JobStatus::Failed);
                }
            },
            Err(e) => {
                warn!(key, error = %e, "custom aggregation failed");
                jobs.finish(&key, JobStatus::Failed);
            }
        }
    }
}

/// Poll until a job settles or the timeout passes. A timeout yields
/// `Pending` ("not ready"), never `Failed`: the job may still finish and a
/// later request for the same range will find the artifact.
pub async fn wait_ready(
    jobs: &JobStore,
    key: &str,
    poll: Duration,
    timeout: Duration,
) -> JobStatus {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match jobs.status(key) {
            Some(JobStatus::Ready) => return JobStatus::Ready,
            Some(JobStatus::Failed) => return JobStatus::Failed,
            _ => {}
        }
        if tokio::time::Instant::now() >= deadline {
            return JobStatus::Pending;
        }
        tokio::time::sleep(poll).await;
    }
}
