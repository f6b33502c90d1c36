//! One backend per shard, resolved through a [`ShardRouter`].

use serde::Serialize;

use super::router::{RouteError, ShardId, ShardRouter};
use crate::pool::{CloseSummary, ConnectionFactory, ConnectionPool, PoolError, PoolOptions, PoolStatus};

/// A value per shard plus the router that picks between them.
#[derive(Debug, Clone)]
pub struct ShardSet<T> {
    first: T,
    second: T,
    router: ShardRouter,
}

impl<T> ShardSet<T> {
    pub fn new(first: T, second: T) -> Self {
        Self {
            first,
            second,
            router: ShardRouter::new(),
        }
    }

    pub fn shard(&self, id: ShardId) -> &T {
        match id {
            ShardId::First => &self.first,
            ShardId::Second => &self.second,
        }
    }

    /// Resolve the backend that owns `key`.
    pub fn get(&self, key: &str) -> Result<(ShardId, &T), RouteError> {
        let id = self.router.route(key)?;
        Ok((id, self.shard(id)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShardId, &T)> {
        ShardId::ALL.into_iter().map(move |id| (id, self.shard(id)))
    }
}

/// Pool status tagged with the shard it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct ShardPoolStatus {
    pub shard: ShardId,
    #[serde(flatten)]
    pub pool: PoolStatus,
}

impl<F: ConnectionFactory> ShardSet<ConnectionPool<F>> {
    /// Build one pool per shard.
    ///
    /// If the second pool cannot be built, the first is closed before the
    /// error is returned.
    pub async fn connect(
        first: F,
        second: F,
        options: impl Fn(ShardId) -> PoolOptions,
    ) -> Result<Self, (ShardId, PoolError)> {
        let first_pool = ConnectionPool::connect(first, options(ShardId::First))
            .await
            .map_err(|e| (ShardId::First, e))?;

        let second_pool = match ConnectionPool::connect(second, options(ShardId::Second)).await {
            Ok(pool) => pool,
            Err(e) => {
                if let Err(close_err) = first_pool.close().await {
                    tracing::warn!(error = %close_err, "Failed to close first shard pool");
                }
                return Err((ShardId::Second, e));
            }
        };

        Ok(Self::new(first_pool, second_pool))
    }

    pub fn status(&self) -> Vec<ShardPoolStatus> {
        self.iter()
            .map(|(shard, pool)| ShardPoolStatus {
                shard,
                pool: pool.status(),
            })
            .collect()
    }

    /// Close both pools, even if the first close fails.
    pub async fn close_all(&self) -> Vec<(ShardId, Result<CloseSummary, PoolError>)> {
        let mut results = Vec::with_capacity(ShardId::ALL.len());
        for (shard, pool) in self.iter() {
            let result = pool.close().await;
            if let Err(e) = &result {
                tracing::warn!(shard = %shard, error = %e, "Failed to close shard pool");
            }
            results.push((shard, result));
        }
        results
    }
}
