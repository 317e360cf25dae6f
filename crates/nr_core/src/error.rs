use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed or out-of-range request input. Raised before any backend work.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The nearby strategy was selected but no coordinates could be resolved.
    #[error("Missing location: {0}")]
    MissingGeo(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cache error: {0}")]
    Cache(String),

    /// Another caller held the fill lock for longer than the wait bound.
    #[error("Timed out waiting for cache key {0}")]
    CacheTimeout(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Enrichment error: {0}")]
    Enrichment(String),

    #[error("Trending computation failed for tile {tile}: {reason}")]
    TrendingCompute { tile: String, reason: String },

    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Errors caused by the caller's input, safe to echo back verbatim.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::MissingGeo(_) | Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
