//! Error types for config loading and signal parsing.

use thiserror::Error;

/// Errors raised while loading or validating the daemon configuration.
///
/// All of these are fatal: the daemon refuses to run on a partial config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("missing required config: {0}")]
    Missing(&'static str),

    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Errors raised while turning raw upstream values into signals.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("unrecognized eviction rate bucket: {0:?}")]
    EvictionBucket(String),
}
