use std::error::Error;

use async_trait::async_trait;
use thiserror::Error;

use crate::pool::{BoxError, ConnectionFactory, ConnectionPool, PoolError};

/// One logical unit of work performed on a connection.
#[async_trait]
pub trait Operation<C: Send>: Send + Sync + 'static {
    type Error: Error + Send + Sync + 'static;

    async fn run(&self, conn: &mut C) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("failed to open connection: {0}")]
    Connect(#[source] BoxError),

    #[error("operation failed: {0}")]
    Operation(#[source] BoxError),
}

/// Acquire a pooled connection, run `op` once, release.
///
/// An operation failure is returned to the caller; the connection goes back
/// to the pool unchanged.
pub async fn run_pooled<F, O>(pool: &ConnectionPool<F>, op: &O) -> Result<(), WorkerError>
where
    F: ConnectionFactory,
    O: Operation<F::Connection>,
{
    let mut conn = pool.acquire().await?;
    op.run(&mut *conn)
        .await
        .map_err(|e| WorkerError::Operation(Box::new(e)))
}

/// Open a dedicated connection, run `op` once, close it.
pub async fn run_unpooled<F, O>(factory: &F, op: &O) -> Result<(), WorkerError>
where
    F: ConnectionFactory,
    O: Operation<F::Connection>,
{
    let mut conn = factory
        .connect()
        .await
        .map_err(|e| WorkerError::Connect(Box::new(e)))?;

    let result = op.run(&mut conn).await;

    if let Err(e) = factory.close(conn).await {
        tracing::warn!(error = %e, "Failed to close unpooled connection");
    }
    result.map_err(|e| WorkerError::Operation(Box::new(e)))
}
