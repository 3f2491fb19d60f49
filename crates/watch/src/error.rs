//! Error types for the watch loop
//!
//! Every variant is local to one apply cycle. The watch loop logs it and
//! tries again on the next tick.

use config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error("Invalid rule file pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Failed to read rule file {path:?}: {source}")]
    RuleFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Reload request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error(
        "Reload rejected with status {status}; is the server's lifecycle API enabled (`--web.enable-lifecycle`)?"
    )]
    ReloadRejected { status: u16 },
}

/// Why a reload request never produced a response
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("cancelled by shutdown")]
    Cancelled,
}

impl WatchError {
    /// Whether this failure came from the reload call rather than the files
    pub fn is_reload_failure(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::ReloadRejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
