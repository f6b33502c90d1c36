//! Graceful shutdown handling.
//!
//! Order matters: the HTTP server stops accepting requests and finishes the
//! in-flight ones first, then every shard pool is drained and closed. Pools
//! must not be closed while handlers may still acquire from them.

use std::time::Duration;

use tokio::signal;
use tokio::time::timeout;

use crate::users::UserStore;

/// How long to wait for checked-out connections to come back before giving up.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

/// Close every shard pool, waiting at most `drain_timeout` in total.
///
/// Returns `false` if the deadline passed with connections still checked out.
pub async fn close_store(store: &dyn UserStore, drain_timeout: Duration) -> bool {
    match timeout(drain_timeout, store.close()).await {
        Ok(results) => {
            for (shard, result) in results {
                match result {
                    Ok(summary) => tracing::info!(
                        shard = %shard,
                        closed = summary.closed,
                        failed = summary.failed,
                        "Shard pool closed"
                    ),
                    Err(e) => tracing::warn!(shard = %shard, error = %e, "Shard pool close failed"),
                }
            }
            true
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = drain_timeout.as_secs(),
                "Timed out draining shard pools; connections still checked out"
            );
            false
        }
    }
}
