//! spotprio-core: signal records, priority scoring, and configuration.
//!
//! This crate holds everything that is pure: the node-pool signal model,
//! the scoring formula that turns signals into a priority ranking, the
//! safety predicate over that ranking, and the helpers that assemble
//! records from raw market data. It performs no I/O apart from reading
//! the config file.
//!
//! # Scoring
//!
//! ```text
//! availability = (1 - eviction_rate)        * 0.2
//! discount     = discount                   * 0.1
//! placement    = placement_score / 100      * 0.6
//! generation   = min(version, 10) / 10      * 0.1
//!
//! priority     = floor(100 * (availability + discount + placement + generation))
//! ```

pub mod config;
pub mod error;
pub mod safety;
pub mod scorer;
pub mod signals;
pub mod types;

pub use config::SpotprioConfig;
pub use error::{ConfigError, SignalError};
pub use safety::check_spot_is_safe;
pub use scorer::{PriorityScorer, ScoringWeights};
pub use signals::{MarketSignals, PoolDescriptor, RetailPriceItem, assemble_records};
pub use types::*;
