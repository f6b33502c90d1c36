use std::time::Duration;

use thiserror::Error;

use super::factory::BoxError;

/// Errors returned by [`ConnectionPool`](super::ConnectionPool).
#[derive(Debug, Error)]
pub enum PoolError {
    /// A pool must hold at least one connection.
    #[error("pool capacity must be at least 1")]
    ZeroCapacity,

    /// Construction failed while opening connection `index` (zero-based).
    #[error("failed to open connection {index} of {capacity}: {source}")]
    Open {
        index: usize,
        capacity: usize,
        #[source]
        source: BoxError,
    },

    /// A connection marked broken could not be replaced.
    #[error("failed to replace broken connection: {0}")]
    Replace(#[source] BoxError),

    #[error("timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    #[error("connection pool is closed")]
    Closed,

    #[error("connection pool was already closed")]
    AlreadyClosed,
}

impl PoolError {
    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::Timeout(_) | PoolError::Replace(_))
    }
}
