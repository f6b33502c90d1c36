//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;
use crate::shard::ShardPoolStatus;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub shards: Vec<ShardHealthResponse>,
}

#[derive(Debug, Serialize)]
pub struct ShardHealthResponse {
    pub shard: String,
    pub pool: String,
    pub capacity: usize,
    pub idle: usize,
    pub in_use: usize,
    pub closed: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub shards: Vec<ShardPoolStatus>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let shards: Vec<ShardHealthResponse> = state
        .users
        .store()
        .pool_status()
        .into_iter()
        .map(|s| ShardHealthResponse {
            shard: s.shard.to_string(),
            pool: s.pool.name,
            capacity: s.pool.capacity,
            idle: s.pool.idle,
            in_use: s.pool.in_use,
            closed: s.pool.closed,
        })
        .collect();

    let status = if shards.iter().any(|s| s.closed) {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        shards,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        shards: state.users.store().pool_status(),
    })
}
