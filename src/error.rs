//! Error types shared across the monitoring engine
//!
//! Probe failures are deliberately absent here: a probe never fails, it records
//! the failure as data on the [`ProbeResult`](crate::monitors::probe::ProbeResult).

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the endpoint store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("endpoint store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The endpoint list could not be encoded
    #[error("endpoint store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while persisting notification state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("notification state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("notification state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by an alert transport
#[derive(Debug, Error)]
pub enum AlertError {
    /// Credential, destination or enabled flag missing
    #[error("alert transport is not configured (bot token, chat id and enabled flag are required)")]
    NotConfigured,

    /// The request to the messaging API failed
    #[error("alert request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The messaging API answered but refused the message
    #[error("alert rejected by messaging API: {0}")]
    Rejected(String),
}

/// Errors raised while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
