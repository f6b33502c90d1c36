//! Fixed-capacity connection pool.
//!
//! - `ConnectionFactory`: driver boundary that opens and closes connections
//! - `ConnectionPool`: bounded buffer of pre-opened connections
//! - `PooledConnection`: RAII checkout that releases on drop
//! - `PoolStatus`: counters snapshot for health endpoints and metrics

mod error;
mod factory;
mod guard;
#[allow(clippy::module_inception)]
mod pool;
mod status;

pub use error::PoolError;
pub use factory::{BoxError, ConnectionFactory};
pub use guard::PooledConnection;
pub use pool::{CloseSummary, ConnectionPool, PoolOptions};
pub use status::PoolStatus;
