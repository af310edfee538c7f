//! Error taxonomy for the ingestion and retrieval paths.
//!
//! `Transport`, `Upstream` and `Embedding` are absorbed inside the ingestion
//! orchestrator and only reduce yield. `Persist`, `Ranking` and `Timeout` are
//! terminal and always reach the caller.

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Network-level failure talking to the catalog source.
    #[error("transport error: {0}")]
    Transport(String),

    /// The catalog source answered with a non-success status or a malformed body.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// An embedding request failed, timed out, or returned an unusable vector.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The bulk write was rejected; nothing from the batch is visible.
    #[error("persist error: {0}")]
    Persist(String),

    /// The query text could not be embedded.
    #[error("ranking error: {0}")]
    Ranking(String),

    /// The ingestion deadline expired before the batch was aggregated.
    #[error("ingestion deadline of {0:?} exceeded")]
    Timeout(std::time::Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Classify a reqwest failure as seen from the catalog source.
    pub(crate) fn from_catalog_request(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Upstream(format!("malformed catalog response: {err}"))
        } else if let Some(status) = err.status() {
            Self::Upstream(format!("catalog returned HTTP {status}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}
