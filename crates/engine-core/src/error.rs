use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`Transport`](crate::transport::Transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient transport failure: {0}")]
    Transient(String),
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Resource manager has been shut down")]
    ShutDown,
}
