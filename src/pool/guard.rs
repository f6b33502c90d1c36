//! Scoped checkout of a pooled connection.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::factory::ConnectionFactory;
use super::pool::{PoolInner, Slot};

const DEREF_ERR: &str = "PooledConnection used after its connection was detached";

/// A connection checked out of a [`ConnectionPool`](super::ConnectionPool).
///
/// Dereferences to the underlying connection. Dropping the guard returns the
/// connection to the pool, on every exit path including `?` and panics, so a
/// worker cannot forget to release it or release it twice.
///
/// Failed operations do not change what happens on release: the connection
/// goes back as-is unless [`mark_broken`](Self::mark_broken) was called.
pub struct PooledConnection<F: ConnectionFactory> {
    conn: Option<F::Connection>,
    broken: bool,
    acquired_at: Instant,
    pool: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    pub(crate) fn checkout(pool: Arc<PoolInner<F>>, conn: F::Connection, broken: bool) -> Self {
        pool.counters().record_checkout();
        Self {
            conn: Some(conn),
            broken,
            acquired_at: Instant::now(),
            pool,
        }
    }

    /// Put `fresh` in place of the held connection and clear the broken flag.
    pub(crate) fn swap(&mut self, fresh: F::Connection) -> Option<F::Connection> {
        self.broken = false;
        self.conn.replace(fresh)
    }

    /// Flag the connection as unusable. On release the pool closes it and
    /// opens a replacement before handing the slot out again.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_marked_broken(&self) -> bool {
        self.broken
    }

    /// How long this connection has been checked out.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }

    /// Return the connection to the pool now rather than at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect(DEREF_ERR)
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect(DEREF_ERR)
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let slot = if self.broken {
            Slot::Broken(conn)
        } else {
            Slot::Ready(conn)
        };
        tracing::trace!(
            pool = %self.pool.name(),
            held_ms = self.held_for().as_millis() as u64,
            broken = self.broken,
            "Connection released"
        );
        self.pool.release(slot);
    }
}

impl<F> fmt::Debug for PooledConnection<F>
where
    F: ConnectionFactory,
    F::Connection: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool.name())
            .field("conn", &self.conn)
            .field("broken", &self.broken)
            .finish()
    }
}
