//! PostgreSQL driver for the connection pool.
//!
//! Provides the `ConnectionFactory` that opens raw `sqlx` connections, the
//! `SELECT 1` benchmark operation and the user-table queries.

mod driver;
mod users;

pub use driver::{PgConnectionFactory, PgDriverError, SelectOne};
