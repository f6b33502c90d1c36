use async_trait::async_trait;
use thiserror::Error;

use super::types::NewUser;
use crate::pool::{BoxError, CloseSummary, ConnectionFactory, ConnectionPool, PoolError};
use crate::shard::{RouteError, ShardId, ShardPoolStatus, ShardSet};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("user {0} already exists")]
    Duplicate(String),

    /// The connection itself is unusable; it is replaced before reuse.
    #[error("database connection lost: {0}")]
    ConnectionLost(#[source] BoxError),

    #[error("database error: {0}")]
    Backend(#[source] BoxError),
}

/// Queries the user service needs from a single connection.
#[async_trait]
pub trait UserConnection: Send {
    /// Create the `users` table if it does not exist.
    async fn ensure_schema(&mut self) -> Result<(), StoreError>;

    /// Insert a row. A taken username is [`StoreError::Duplicate`].
    async fn insert_user(&mut self, user: &NewUser) -> Result<(), StoreError>;

    async fn password_hash(&mut self, username: &str) -> Result<Option<String>, StoreError>;
}

/// Shard-aware user persistence used by the HTTP layer.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Store `user` on the shard that owns its username.
    async fn insert_user(&self, user: &NewUser) -> Result<ShardId, StoreError>;

    /// Look up the stored hash on the shard that owns `username`.
    async fn password_hash(&self, username: &str)
        -> Result<(ShardId, Option<String>), StoreError>;

    fn pool_status(&self) -> Vec<ShardPoolStatus>;

    /// Drain and close every shard's pool.
    async fn close(&self) -> Vec<(ShardId, Result<CloseSummary, PoolError>)>;
}

/// [`UserStore`] backed by one [`ConnectionPool`] per shard.
pub struct ShardedUserStore<F: ConnectionFactory> {
    shards: ShardSet<ConnectionPool<F>>,
}

impl<F> ShardedUserStore<F>
where
    F: ConnectionFactory,
    F::Connection: UserConnection,
{
    pub fn new(shards: ShardSet<ConnectionPool<F>>) -> Self {
        Self { shards }
    }

    pub fn shards(&self) -> &ShardSet<ConnectionPool<F>> {
        &self.shards
    }

    /// Create the `users` table on every shard.
    pub async fn bootstrap(&self) -> Result<(), (ShardId, StoreError)> {
        for (shard, pool) in self.shards.iter() {
            let mut conn = pool.acquire().await.map_err(|e| (shard, StoreError::from(e)))?;
            conn.ensure_schema().await.map_err(|e| (shard, e))?;
            tracing::info!(shard = %shard, pool = %pool.name(), "Users table ready");
        }
        Ok(())
    }
}

#[async_trait]
impl<F> UserStore for ShardedUserStore<F>
where
    F: ConnectionFactory,
    F::Connection: UserConnection,
{
    async fn insert_user(&self, user: &NewUser) -> Result<ShardId, StoreError> {
        let (shard, pool) = self.shards.get(&user.username)?;
        let mut conn = pool.acquire().await?;

        match conn.insert_user(user).await {
            Ok(()) => {
                tracing::info!(shard = %shard, username = %user.username, "User created");
                Ok(shard)
            }
            Err(e) => {
                if matches!(e, StoreError::ConnectionLost(_)) {
                    conn.mark_broken();
                }
                Err(e)
            }
        }
    }

    async fn password_hash(
        &self,
        username: &str,
    ) -> Result<(ShardId, Option<String>), StoreError> {
        let (shard, pool) = self.shards.get(username)?;
        let mut conn = pool.acquire().await?;

        match conn.password_hash(username).await {
            Ok(hash) => Ok((shard, hash)),
            Err(e) => {
                if matches!(e, StoreError::ConnectionLost(_)) {
                    conn.mark_broken();
                }
                Err(e)
            }
        }
    }

    fn pool_status(&self) -> Vec<ShardPoolStatus> {
        self.shards.status()
    }

    async fn close(&self) -> Vec<(ShardId, Result<CloseSummary, PoolError>)> {
        self.shards.close_all().await
    }
}
