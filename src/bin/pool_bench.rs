//! Runs the same `SELECT 1` workload twice against `database`: once through a
//! pool of `pool.size` connections, once with a fresh connection per worker.

use std::sync::Arc;

use anyhow::{Context, Result};

use shardpool::config::Settings;
use shardpool::pool::PoolOptions;
use shardpool::postgres::{PgConnectionFactory, SelectOne};
use shardpool::telemetry::init_tracing;
use shardpool::workload::Workload;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new().context("loading configuration")?;
    init_tracing(&settings.logging);

    let factory = PgConnectionFactory::new(&settings.database);
    let workload = Workload::new(settings.bench.concurrency);
    let op = Arc::new(SelectOne);

    tracing::info!(
        target_db = %settings.database.masked(),
        concurrency = workload.concurrency(),
        pool_size = settings.pool.size,
        "Starting pooling benchmark"
    );

    let (pooled, summary) = workload
        .run_with_pool(
            factory.clone(),
            PoolOptions::from_config("bench", &settings.pool),
            Arc::clone(&op),
        )
        .await
        .context("running pooled workload")?;
    tracing::info!(closed = summary.closed, failed = summary.failed, "Pool closed");

    let unpooled = workload.run_unpooled(Arc::new(factory), op).await;

    for report in [&pooled, &unpooled] {
        tracing::info!(
            mode = %report.mode,
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Benchmark result"
        );
    }

    if !pooled.all_succeeded() || !unpooled.all_succeeded() {
        anyhow::bail!(
            "benchmark had failures: pooled {}/{}, unpooled {}/{}",
            pooled.failed,
            pooled.workers,
            unpooled.failed,
            unpooled.workers
        );
    }
    Ok(())
}
