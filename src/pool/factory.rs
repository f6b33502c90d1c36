//! Driver boundary between the pool and whatever actually speaks to the database.

use async_trait::async_trait;

/// Boxed error used wherever a driver error crosses into pool-level types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Opens and closes connections for a [`ConnectionPool`](super::ConnectionPool).
///
/// The pool owns the lifetime of every connection it holds but never looks
/// inside one: it only calls [`connect`](Self::connect) when it needs a new
/// connection and [`close`](Self::close) exactly once when it retires one.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The opaque connection handle.
    type Connection: Send + 'static;

    /// Connectivity error reported by the driver.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish a new connection.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Close a connection. Called at most once per connection.
    async fn close(&self, conn: Self::Connection) -> Result<(), Self::Error>;

    /// Human-readable target for logs. Must not contain credentials.
    fn describe(&self) -> String {
        "unknown".to_string()
    }
}
