//! Prometheus metrics for pools, shard routing and the user API.
//!
//! - Pool metrics (checkouts, wait time, timeouts, opened/closed connections)
//! - Pool gauges refreshed from `PoolStatus` when `/metrics` is scraped
//! - Shard routing decisions
//! - User API outcomes

mod helpers;

pub use helpers::{encode_metrics, PoolMetrics, ShardMetrics, UserMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "shardpool";

lazy_static! {
    // ============================================================================
    // Pool Metrics
    // ============================================================================

    /// Successful checkouts per pool
    pub static ref POOL_ACQUIRED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_pool_acquired_total", METRIC_PREFIX),
        "Total connections checked out of the pool",
        &["pool"]
    ).unwrap();

    /// Time spent waiting for a buffered connection
    pub static ref POOL_ACQUIRE_WAIT_SECONDS: HistogramVec = register_histogram_vec!(
        format!("{}_pool_acquire_wait_seconds", METRIC_PREFIX),
        "Time spent waiting for a pooled connection in seconds",
        &["pool"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    /// Acquire calls that hit their deadline
    pub static ref POOL_ACQUIRE_TIMEOUTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_pool_acquire_timeouts_total", METRIC_PREFIX),
        "Total acquire calls that timed out",
        &["pool"]
    ).unwrap();

    /// Connections opened (initial fill and replacements)
    pub static ref POOL_CONNECTIONS_OPENED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_pool_connections_opened_total", METRIC_PREFIX),
        "Total connections opened by the pool",
        &["pool"]
    ).unwrap();

    /// Connections closed (shutdown and replacements)
    pub static ref POOL_CONNECTIONS_CLOSED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_pool_connections_closed_total", METRIC_PREFIX),
        "Total connections closed by the pool",
        &["pool"]
    ).unwrap();

    /// Buffered connections
    pub static ref POOL_CONNECTIONS_IDLE: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_pool_connections_idle", METRIC_PREFIX),
        "Connections currently buffered in the pool",
        &["pool"]
    ).unwrap();

    /// Checked-out connections
    pub static ref POOL_CONNECTIONS_IN_USE: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_pool_connections_in_use", METRIC_PREFIX),
        "Connections currently checked out by workers",
        &["pool"]
    ).unwrap();

    /// Callers suspended in acquire
    pub static ref POOL_WAITERS: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_pool_waiters", METRIC_PREFIX),
        "Callers currently waiting for a pooled connection",
        &["pool"]
    ).unwrap();

    // ============================================================================
    // Shard Metrics
    // ============================================================================

    /// Routing decisions per shard
    pub static ref SHARD_ROUTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_shard_routed_total", METRIC_PREFIX),
        "Total keys routed to each shard",
        &["shard"]
    ).unwrap();

    /// Keys the router refused
    pub static ref SHARD_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_shard_rejected_total", METRIC_PREFIX),
        "Total routing keys rejected",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // User API Metrics
    // ============================================================================

    /// Register/login outcomes
    pub static ref USER_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_user_requests_total", METRIC_PREFIX),
        "Total user API requests by operation and outcome",
        &["operation", "outcome"]
    ).unwrap();
}
