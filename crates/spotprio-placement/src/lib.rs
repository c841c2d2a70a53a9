//! spotprio-placement: spot placement scores behind a TTL cache.
//!
//! Placement scores are the most volatile and the most rate-limited
//! signal, so they are fetched in chunks, retried on throttling, and
//! memoized in a single-entry cache owned by the caller.
//!
//! # Components
//!
//! - **`cache`**: singleton [`PlacementCache`] keyed by region, account
//!   and the sorted instance-type set
//! - **`fetcher`**: [`PlacementFetcher`]: chunking, 429 backoff, caching
//! - **`api`**: wire types and the [`PlacementApi`] transport seam
//! - **`token`**: bearer token sources (managed identity, static)
//!
//! ```text
//! fetch(region, account, types)
//!   ├── cache hit (same key, age < 15m) → scores
//!   └── miss → token → chunks of 5 → POST (429: 1m, 4m) → merge → store
//! ```

pub mod api;
pub mod cache;
pub mod error;
pub mod fetcher;
pub mod token;

pub use api::{ApiResponse, ArmPlacementClient, PlacementApi, PlacementRequest, bucket_score};
pub use cache::{PLACEMENT_TTL, PlacementCache};
pub use error::{PlacementError, PlacementResult};
pub use fetcher::{CHUNK_SIZE, PlacementFetcher, RetryPolicy};
pub use token::{AccessToken, ManagedIdentityToken, StaticToken, TokenSource};
