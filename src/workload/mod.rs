//! Worker protocol and the pooled-vs-unpooled workload runner.
//!
//! A worker performs exactly one logical [`Operation`] per checkout:
//! acquire, run, release. Release happens on every exit path because the
//! checkout is a [`PooledConnection`](crate::pool::PooledConnection) guard.

mod operation;
mod runner;

pub use operation::{run_pooled, run_unpooled, Operation, WorkerError};
pub use runner::{Workload, WorkloadMode, WorkloadReport};
