//! Spawns `concurrency` workers that each perform one operation, either
//! through a shared pool or with a connection of their own.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinSet;

use super::operation::{run_pooled, run_unpooled, Operation, WorkerError};
use crate::pool::{CloseSummary, ConnectionFactory, ConnectionPool, PoolError, PoolOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadMode {
    Pooled,
    Unpooled,
}

impl fmt::Display for WorkloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadMode::Pooled => f.write_str("pooled"),
            WorkloadMode::Unpooled => f.write_str("unpooled"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkloadReport {
    pub mode: WorkloadMode,
    pub workers: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl WorkloadReport {
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.workers
    }
}

/// Fixed number of concurrent workers sharing one operation.
#[derive(Debug, Clone, Copy)]
pub struct Workload {
    concurrency: usize,
}

impl Workload {
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Every worker checks a connection out of `pool`.
    pub async fn run_pooled<F, O>(&self, pool: &ConnectionPool<F>, op: Arc<O>) -> WorkloadReport
    where
        F: ConnectionFactory,
        O: Operation<F::Connection>,
    {
        let started = Instant::now();
        let mut workers = JoinSet::new();
        for _ in 0..self.concurrency {
            let pool = pool.clone();
            let op = Arc::clone(&op);
            workers.spawn(async move { run_pooled(&pool, op.as_ref()).await });
        }
        self.collect(WorkloadMode::Pooled, workers, started).await
    }

    /// Open a pool, run [`run_pooled`](Self::run_pooled) on it, then close it.
    ///
    /// The report's `elapsed` spans the whole lifecycle, so it compares with
    /// [`run_unpooled`](Self::run_unpooled) whose workers pay for their own
    /// connect and close.
    pub async fn run_with_pool<F, O>(
        &self,
        factory: F,
        options: PoolOptions,
        op: Arc<O>,
    ) -> Result<(WorkloadReport, CloseSummary), PoolError>
    where
        F: ConnectionFactory,
        O: Operation<F::Connection>,
    {
        let started = Instant::now();
        let pool = ConnectionPool::connect(factory, options).await?;
        let mut report = self.run_pooled(&pool, op).await;
        let summary = pool.close().await?;
        report.elapsed = started.elapsed();
        Ok((report, summary))
    }

    /// Every worker opens and closes a connection of its own.
    pub async fn run_unpooled<F, O>(&self, factory: Arc<F>, op: Arc<O>) -> WorkloadReport
    where
        F: ConnectionFactory,
        O: Operation<F::Connection>,
    {
        let started = Instant::now();
        let mut workers = JoinSet::new();
        for _ in 0..self.concurrency {
            let factory = Arc::clone(&factory);
            let op = Arc::clone(&op);
            workers.spawn(async move { run_unpooled(factory.as_ref(), op.as_ref()).await });
        }
        self.collect(WorkloadMode::Unpooled, workers, started).await
    }

    async fn collect(
        &self,
        mode: WorkloadMode,
        mut workers: JoinSet<Result<(), WorkerError>>,
        started: Instant,
    ) -> WorkloadReport {
        let mut succeeded = 0;
        let mut failed = 0;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(e)) => {
                    failed += 1;
                    tracing::warn!(mode = %mode, error = %e, "Worker failed");
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(mode = %mode, error = %e, "Worker task aborted");
                }
            }
        }

        let report = WorkloadReport {
            mode,
            workers: self.concurrency,
            succeeded,
            failed,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            mode = %mode,
            workers = report.workers,
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Workload finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolOptions;
    use crate::testing::{MemoryFactory, MemoryQuery};

    #[tokio::test]
    async fn test_pooled_workload_shares_capacity() {
        let factory = MemoryFactory::new();
        let pool = ConnectionPool::connect(factory.clone(), PoolOptions::new(10))
            .await
            .unwrap();
        let op = Arc::new(MemoryQuery::new().with_delay(Duration::from_millis(1)));

        let report = Workload::new(150).run_pooled(&pool, op).await;

        assert_eq!(report.mode, WorkloadMode::Pooled);
        assert_eq!(report.succeeded, 150);
        assert!(report.all_succeeded());
        assert_eq!(factory.opened(), 10);
        let status = pool.status();
        assert_eq!(status.idle, 10);
        assert_eq!(status.in_use, 0);
        assert_eq!(status.acquired_total, 150);
    }

    #[tokio::test]
    async fn test_pool_lifecycle_is_part_of_pooled_time() {
        let factory = MemoryFactory::new().with_close_delay(Duration::from_millis(20));
        factory.set_connect_delay(Duration::from_millis(20));

        let (report, summary) = Workload::new(6)
            .run_with_pool(factory.clone(), PoolOptions::new(2), Arc::new(MemoryQuery::new()))
            .await
            .unwrap();

        assert!(report.all_succeeded());
        assert_eq!(summary.closed, 2);
        assert_eq!(factory.closed(), 2);
        // Two sequential opens and two sequential closes
        assert!(report.elapsed >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_unpooled_workload_opens_per_worker() {
        let factory = Arc::new(MemoryFactory::new());

        let report = Workload::new(25)
            .run_unpooled(Arc::clone(&factory), Arc::new(MemoryQuery::new()))
            .await;

        assert_eq!(report.mode, WorkloadMode::Unpooled);
        assert_eq!(report.succeeded, 25);
        assert_eq!(factory.opened(), 25);
        assert_eq!(factory.closed(), 25);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let pool = ConnectionPool::connect(MemoryFactory::new(), PoolOptions::new(2))
            .await
            .unwrap();

        let report = Workload::new(8)
            .run_pooled(&pool, Arc::new(MemoryQuery::new().failing()))
            .await;

        assert_eq!(report.failed, 8);
        assert_eq!(report.succeeded, 0);
        assert_eq!(pool.status().idle, 2);
    }
}
