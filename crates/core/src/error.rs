//! Error types for the Beacon core crate.

use thiserror::Error;

/// Top-level error type for all Beacon operations.
///
/// Only [`BeaconError::Config`] ever reaches the host application from the
/// telemetry pipeline; every other failure is absorbed and logged.
#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("preference store error: {0}")]
    Preference(String),
}

impl From<serde_json::Error> for BeaconError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A convenience Result alias that defaults to [`BeaconError`].
pub type Result<T> = std::result::Result<T, BeaconError>;
