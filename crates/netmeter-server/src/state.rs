//! Shared state handed to HTTP handlers and background workers.

use std::sync::Arc;

use tokio::sync::RwLock;

use netmeter_config::Config;
use netmeter_report::{JobStore, ReportCache};
use netmeter_store::CounterStore;

use crate::groups::GroupStore;

/// Everything the HTTP layer and the scheduler share.
///
/// The pause gate serializes restores against everything else: collection
/// and aggregation hold the read side for the duration of one unit of
/// work, a restore takes the write side.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<CounterStore>,
    pub cache: Arc<ReportCache>,
    pub jobs: Arc<JobStore>,
    pub groups: Arc<GroupStore>,
    pub gate: Arc<RwLock<()>>,
}
