//! Reconciler error types.

use thiserror::Error;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors that can occur while publishing the ranking.
///
/// Store errors are carried through untouched; there is no retry here.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed to serialize priorities: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("config store error: {0}")]
    Store(String),
}
