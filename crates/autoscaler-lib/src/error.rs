//! Error types for stats watchers

use thiserror::Error;

/// Reasons a stats watcher stops
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to open stats stream: {0:#}")]
    Connect(anyhow::Error),
    #[error("stats stream read failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to decode stats record: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("stats stream closed")]
    Closed,
}

impl WatchError {
    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            WatchError::Connect(_) => "connect",
            WatchError::Read(_) => "read",
            WatchError::Decode(_) => "decode",
            WatchError::Closed => "closed",
        }
    }
}
