//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `config`: Application configuration and settings
//! - `error`: Unified error types for the HTTP layer
//! - `metrics`: Prometheus metrics helpers
//! - `postgres`: Postgres driver for the connection pool

pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
