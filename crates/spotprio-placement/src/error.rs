//! Placement fetch error types.

use thiserror::Error;

pub type PlacementResult<T> = Result<T, PlacementError>;

/// Errors that can occur while acquiring placement scores.
///
/// None of these leave anything in the cache: a fetch either stores the
/// complete result or nothing.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// No bearer token could be acquired. Not recoverable by retrying.
    #[error("failed to acquire access token: {0}")]
    Credential(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("placement API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("failed to decode placement response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("placement fetch cancelled by shutdown")]
    Cancelled,
}

impl PlacementError {
    /// Whether the daemon should stop instead of waiting for the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlacementError::Credential(_))
    }
}
