//! spotd: spot node-pool priority daemon.
//!
//! Wires the collectors, the placement fetcher, the scorer and the
//! reconciler into a periodic cycle, and serves the spot market gauges
//! on `/metrics`.

pub mod collectors;
pub mod cycle;
pub mod server;
pub mod telemetry;

pub use cycle::{Cycle, CycleError, CycleReport};
