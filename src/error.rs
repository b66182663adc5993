use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reading the local highlight database.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("highlight database not found at {0:?}")]
    Missing(PathBuf),
    #[error("failed to open highlight database")]
    Open(#[source] libsql::Error),
    #[error("highlight query failed")]
    Query(#[from] libsql::Error),
}

/// Failure talking to the remote page store.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed")]
    Http(#[from] reqwest::Error),
    #[error("api returned {status} ({code}): {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{count} blocks exceed the per-request limit of {limit}")]
    TooManyBlocks { count: usize, limit: usize },
}

impl RemoteError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RemoteError::Api { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Anything that ends the processing of a single book.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("source read failed")]
    Source(#[from] SourceError),
    #[error("remote call failed")]
    Remote(#[from] RemoteError),
}
