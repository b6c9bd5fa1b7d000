//! Report server, collector, and scheduler.
//!
//! Ties the pipeline together: a [`collector::RouterSource`] feeds the
//! counter store, the scheduler keeps canonical artifacts and snapshots
//! fresh, and an axum API serves cached artifacts, custom-range jobs,
//! device groups, and restore status.

pub mod cli;
pub mod collector;
mod error;
mod groups;
mod routes;
mod scheduler;
mod state;


pub use cli::ServerArgs;
pub use collector::{DeviceReading, RouterDbSource, RouterSource, collect_cycle};
pub use error::ServerError;
pub use groups::{Group, GroupStore};
pub use routes::api_router;
pub use scheduler::{CANONICAL_PERIODS, previous_month, regenerate_canonical};
pub use state::AppState;
