//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    POOL_ACQUIRED_TOTAL, POOL_ACQUIRE_TIMEOUTS_TOTAL, POOL_ACQUIRE_WAIT_SECONDS,
    POOL_CONNECTIONS_CLOSED_TOTAL, POOL_CONNECTIONS_IDLE, POOL_CONNECTIONS_IN_USE,
    POOL_CONNECTIONS_OPENED_TOTAL, POOL_WAITERS, SHARD_REJECTED_TOTAL, SHARD_ROUTED_TOTAL,
    USER_REQUESTS_TOTAL,
};
use crate::pool::PoolStatus;

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording pool metrics
pub struct PoolMetrics;

impl PoolMetrics {
    /// Record a successful checkout
    pub fn record_acquire(pool: &str) {
        POOL_ACQUIRED_TOTAL.with_label_values(&[pool]).inc();
    }

    /// Record how long a caller waited for a slot
    pub fn observe_wait(pool: &str, waited: Duration) {
        POOL_ACQUIRE_WAIT_SECONDS
            .with_label_values(&[pool])
            .observe(waited.as_secs_f64());
    }

    /// Record an acquire that hit its deadline
    pub fn record_timeout(pool: &str) {
        POOL_ACQUIRE_TIMEOUTS_TOTAL.with_label_values(&[pool]).inc();
    }

    /// Record a newly opened connection
    pub fn record_opened(pool: &str) {
        POOL_CONNECTIONS_OPENED_TOTAL.with_label_values(&[pool]).inc();
    }

    /// Record a closed connection
    pub fn record_closed(pool: &str) {
        POOL_CONNECTIONS_CLOSED_TOTAL.with_label_values(&[pool]).inc();
    }

    /// Refresh gauges from a status snapshot (call when scraping)
    pub fn update_from_status(status: &PoolStatus) {
        let pool = status.name.as_str();
        POOL_CONNECTIONS_IDLE
            .with_label_values(&[pool])
            .set(status.idle as i64);
        POOL_CONNECTIONS_IN_USE
            .with_label_values(&[pool])
            .set(status.in_use as i64);
        POOL_WAITERS
            .with_label_values(&[pool])
            .set(status.waiting as i64);
    }
}

/// Helper struct for recording shard routing metrics
pub struct ShardMetrics;

impl ShardMetrics {
    /// Record a key routed to `shard`
    pub fn record_routed(shard: &str) {
        SHARD_ROUTED_TOTAL.with_label_values(&[shard]).inc();
    }

    /// Record a rejected routing key
    pub fn record_rejected(reason: &str) {
        SHARD_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for recording user API metrics
pub struct UserMetrics;

impl UserMetrics {
    /// Record a registration attempt outcome
    pub fn record_register(outcome: &str) {
        USER_REQUESTS_TOTAL
            .with_label_values(&["register", outcome])
            .inc();
    }

    /// Record a login attempt outcome
    pub fn record_login(outcome: &str) {
        USER_REQUESTS_TOTAL
            .with_label_values(&["login", outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_recorded_pool_metrics() {
        PoolMetrics::record_acquire("metrics-test");
        PoolMetrics::observe_wait("metrics-test", Duration::from_millis(3));
        ShardMetrics::record_routed("metrics-test-shard");

        let output = encode_metrics().unwrap();
        assert!(output.contains("shardpool_pool_acquired_total"));
        assert!(output.contains("metrics-test"));
        assert!(output.contains("shardpool_shard_routed_total"));
    }
}
