use std::time::Duration;

use thiserror::Error;

/// Errors from store operations (used by the `ChatStore` trait in supportdesk-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl RepositoryError {
    /// Whether retrying the same call could succeed.
    ///
    /// Conflicts and missing rows are answers, not outages.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RepositoryError::Connection | RepositoryError::Query(_) | RepositoryError::Timeout(_)
        )
    }
}

/// Errors surfaced by the session registry.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("client id must not be empty")]
    InvalidClientId,

    /// The in-memory change (if any) was kept; only persistence failed.
    #[error("store failure: {0}")]
    Store(#[from] RepositoryError),
}

impl ChatError {
    /// Whether the caller may simply retry the operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::InvalidClientId => false,
            ChatError::Store(_) => true,
        }
    }
}

/// Failure reported by a single observer during fan-out.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// The observer's queue is full; it is too slow to keep up.
    #[error("observer lagging, notice dropped")]
    Lagged,

    /// The observer's endpoint is gone.
    #[error("observer closed")]
    Closed,

    #[error("observer failed: {0}")]
    Failed(String),
}
