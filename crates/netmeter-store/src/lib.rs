//! Append-only counter ledger for per-device traffic samples.
//!
//! The store is the source of truth for the reporting pipeline: raw
//! cumulative counter samples go in, reconciled traffic deltas come out.
//! Counter resets (router reboot, stats clear) are detected during
//! reconciliation and recorded as marker rows for diagnostics.

mod error;
mod import;
mod queries;
mod sample;
mod store;

#[cfg(test)]
mod tests;

pub use error::StoreError;
pub use import::ExternalSample;
pub use sample::{CounterSample, TrafficDelta, reconcile};
pub use store::{
    AppDelta, CounterStore, DeviceDelta, DeviceInfo, ResetEvent, check_database, fallback_name,
};
