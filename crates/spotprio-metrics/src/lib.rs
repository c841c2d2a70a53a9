//! spotprio-metrics: spot market gauges for Prometheus.
//!
//! The reconciliation cycle records the raw signals it observed per
//! region and instance type; the daemon renders them on `/metrics`.
//!
//! ```text
//! SpotGauges
//!   ├── record_prices() / record_eviction_rate() / record_placement_score()
//!   └── render() → text/plain for /metrics endpoint
//! ```

pub mod gauges;
pub mod prometheus;

pub use gauges::{Gauge, SpotGauges};
pub use prometheus::render_prometheus;
