use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use shardpool::config::Settings;
use shardpool::pool::PoolOptions;
use shardpool::postgres::PgConnectionFactory;
use shardpool::server::{create_app, AppState};
use shardpool::shard::ShardSet;
use shardpool::shutdown::{close_store, shutdown_signal, DEFAULT_DRAIN_TIMEOUT};
use shardpool::telemetry::init_tracing;
use shardpool::users::ShardedUserStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("loading configuration")?;

    // Initialize tracing
    init_tracing(&settings.logging);
    tracing::info!("Configuration loaded");

    // One pool per shard
    let shards_config = settings.shards.clone();
    let shards = ShardSet::connect(
        PgConnectionFactory::new(&shards_config.first),
        PgConnectionFactory::new(&shards_config.second),
        |shard| PoolOptions {
            name: format!("shard-{shard}"),
            capacity: shards_config.pool_size,
            acquire_timeout: shards_config.acquire_timeout(),
        },
    )
    .await
    .map_err(|(shard, e)| anyhow::Error::new(e).context(format!("connecting shard {shard}")))?;

    let store = Arc::new(ShardedUserStore::new(shards));
    store
        .bootstrap()
        .await
        .map_err(|(shard, e)| anyhow::Error::new(e).context(format!("bootstrapping shard {shard}")))?;

    // Create application state
    let state = AppState::new(settings.clone(), store.clone());
    tracing::info!("Application state initialized");

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Handlers have finished; nothing acquires from the pools any more
    tracing::info!("Draining shard pools...");
    close_store(store.as_ref(), DEFAULT_DRAIN_TIMEOUT).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
