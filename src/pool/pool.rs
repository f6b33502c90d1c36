//! Fixed-capacity connection pool.
//!
//! The pool opens exactly `capacity` connections up front and keeps them in a
//! bounded buffer of the same capacity. Workers check a connection out with
//! [`ConnectionPool::acquire`] and hand it back by dropping the returned
//! [`PooledConnection`].
//!
//! ```text
//! connect(factory, options)
//!   → open `capacity` connections sequentially (close them all if one fails)
//! acquire()
//!   → slot buffered → return it immediately
//!   → buffer empty  → suspend until a guard is dropped (or the deadline hits)
//! drop(guard)
//!   → slot pushed back into the buffer, next waiter wakes
//! close()
//!   → reclaim `capacity` slots (suspending like acquire), close each once
//!   → wait for broken connections still being closed in the background
//! ```
//!
//! A broken slot stays owned by the checkout guard while its replacement
//! opens. Only once the replacement is attached is the old connection handed
//! to a background task for closing, so dropping an `acquire` future at any
//! point never loses a connection without closing it.
//!
//! Acquire never fails while the pool is open and unbounded. A caller that
//! holds a connection forever starves everyone else; nothing here detects it.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, Notify};

use super::error::PoolError;
use super::factory::ConnectionFactory;
use super::guard::PooledConnection;
use super::status::{PoolCounters, PoolStatus, WaitingGuard};
use crate::config::PoolConfig;
use crate::metrics::PoolMetrics;

/// One unit of pool capacity.
pub(crate) enum Slot<C> {
    /// Live connection ready for reuse.
    Ready(C),
    /// Live connection a worker flagged as unusable; closed and replaced on next checkout.
    Broken(C),
}

/// Construction options for [`ConnectionPool`].
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Label used in logs and metrics
    pub name: String,
    /// Number of connections, fixed for the pool's lifetime
    pub capacity: usize,
    /// Deadline applied by [`ConnectionPool::acquire`]; `None` waits forever
    pub acquire_timeout: Option<Duration>,
}

impl PoolOptions {
    pub fn new(capacity: usize) -> Self {
        Self {
            name: "default".to_string(),
            capacity,
            acquire_timeout: None,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &PoolConfig) -> Self {
        Self {
            name: name.into(),
            capacity: config.size,
            acquire_timeout: config.acquire_timeout(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }
}

/// Outcome of [`ConnectionPool::close`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CloseSummary {
    /// Connections closed cleanly
    pub closed: usize,
    /// Connections whose close call reported an error
    pub failed: usize,
}

/// Bounded, shareable pool of connections produced by `F`.
///
/// Cloning is cheap and yields another handle to the same pool.
pub struct ConnectionPool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

pub(crate) struct PoolInner<F: ConnectionFactory> {
    name: String,
    capacity: usize,
    acquire_timeout: Option<Duration>,
    factory: F,
    /// Sending half of the buffer; `try_send` never blocks, so release works from `Drop`
    release_tx: mpsc::Sender<Slot<F::Connection>>,
    /// Receiving half; waiters queue on the mutex, the holder waits on `recv`
    idle_rx: Mutex<mpsc::Receiver<Slot<F::Connection>>>,
    counters: PoolCounters,
    /// Replaced broken connections whose close has not finished yet
    retiring: AtomicUsize,
    retired: Notify,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Open `options.capacity` connections and buffer them.
    ///
    /// Fails as a whole if any connection cannot be opened; connections that
    /// were already open are closed before the error is returned.
    pub async fn connect(factory: F, options: PoolOptions) -> Result<Self, PoolError> {
        let PoolOptions {
            name,
            capacity,
            acquire_timeout,
        } = options;

        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }

        let counters = PoolCounters::default();
        let mut opened = Vec::with_capacity(capacity);

        for index in 0..capacity {
            match factory.connect().await {
                Ok(conn) => {
                    counters.record_opened();
                    PoolMetrics::record_opened(&name);
                    opened.push(conn);
                }
                Err(e) => {
                    tracing::error!(
                        pool = %name,
                        target = %factory.describe(),
                        index = index,
                        capacity = capacity,
                        error = %e,
                        "Failed to open pooled connection"
                    );
                    let already_open = opened.len();
                    for conn in opened {
                        if let Err(close_err) = factory.close(conn).await {
                            tracing::warn!(
                                pool = %name,
                                error = %close_err,
                                "Failed to close connection after aborted pool construction"
                            );
                        }
                    }
                    tracing::debug!(
                        pool = %name,
                        closed = already_open,
                        "Closed connections opened before the failure"
                    );
                    return Err(PoolError::Open {
                        index,
                        capacity,
                        source: Box::new(e),
                    });
                }
            }
        }

        let (release_tx, idle_rx) = mpsc::channel(capacity);
        for conn in opened {
            // A buffer of `capacity` always fits `capacity` slots
            if release_tx.try_send(Slot::Ready(conn)).is_err() {
                return Err(PoolError::Closed);
            }
        }

        tracing::info!(
            pool = %name,
            target = %factory.describe(),
            capacity = capacity,
            "Connection pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                name,
                capacity,
                acquire_timeout,
                factory,
                release_tx,
                idle_rx: Mutex::new(idle_rx),
                counters,
                retiring: AtomicUsize::new(0),
                retired: Notify::new(),
            }),
        })
    }

    /// Check a connection out, waiting for one if none is buffered.
    ///
    /// Waits indefinitely unless the pool was built with an acquire timeout.
    /// Dropping the returned future before it completes gives up the wait
    /// without losing capacity.
    pub async fn acquire(&self) -> Result<PooledConnection<F>, PoolError> {
        match self.inner.acquire_timeout {
            Some(timeout) => self.acquire_timeout(timeout).await,
            None => self.acquire_inner().await,
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub async fn acquire_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PooledConnection<F>, PoolError> {
        match tokio::time::timeout(timeout, self.acquire_inner()).await {
            Ok(result) => result,
            Err(_) => {
                self.inner.counters.record_timeout();
                PoolMetrics::record_timeout(&self.inner.name);
                tracing::warn!(
                    pool = %self.inner.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for a pooled connection"
                );
                Err(PoolError::Timeout(timeout))
            }
        }
    }

    async fn acquire_inner(&self) -> Result<PooledConnection<F>, PoolError> {
        let inner = &self.inner;
        if inner.counters.is_closed() {
            return Err(PoolError::Closed);
        }

        let started = Instant::now();
        let waiting = WaitingGuard::new(&inner.counters.waiting);
        let mut idle = inner.idle_rx.lock().await;
        let slot = idle.recv().await;
        drop(idle);
        drop(waiting);

        let Some(slot) = slot else {
            return Err(PoolError::Closed);
        };
        PoolMetrics::observe_wait(&inner.name, started.elapsed());

        // The guard owns the slot from here; an early return hands it back.
        let conn = match slot {
            Slot::Ready(c) => PooledConnection::checkout(Arc::clone(inner), c, false),
            Slot::Broken(c) => {
                // Goes back as broken if the open fails or this future is dropped
                let mut conn = PooledConnection::checkout(Arc::clone(inner), c, true);
                let fresh = inner.open_replacement().await?;
                if let Some(old) = conn.swap(fresh) {
                    inner.retire(old);
                }
                conn
            }
        };

        PoolMetrics::record_acquire(&inner.name);
        tracing::trace!(pool = %inner.name, "Connection checked out");
        Ok(conn)
    }

    /// Run `op` on a checked-out connection and release it afterwards,
    /// whether `op` succeeds or fails.
    pub async fn with_connection<T, E, Op>(&self, op: Op) -> Result<T, E>
    where
        Op: for<'c> FnOnce(&'c mut F::Connection) -> BoxFuture<'c, Result<T, E>>,
        E: From<PoolError>,
    {
        let mut conn = self.acquire().await?;
        op(&mut *conn).await
    }

    /// Reclaim every connection and close it.
    ///
    /// Suspends until all checked-out connections have been released, so it
    /// must only be called once workers have stopped acquiring. Afterwards
    /// every `acquire` returns [`PoolError::Closed`].
    pub async fn close(&self) -> Result<CloseSummary, PoolError> {
        let inner = &self.inner;
        if !inner.counters.mark_closed() {
            return Err(PoolError::AlreadyClosed);
        }

        let status = self.status();
        tracing::info!(
            pool = %inner.name,
            capacity = inner.capacity,
            in_use = status.in_use,
            "Connection pool closing"
        );

        let started = Instant::now();
        let mut summary = CloseSummary::default();
        let mut idle = inner.idle_rx.lock().await;

        for _ in 0..inner.capacity {
            match idle.recv().await {
                Some(Slot::Ready(conn)) | Some(Slot::Broken(conn)) => {
                    if inner.close_connection(conn).await {
                        summary.closed += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                None => break,
            }
        }
        idle.close();
        drop(idle);
        inner.wait_retired().await;

        tracing::info!(
            pool = %inner.name,
            closed = summary.closed,
            failed = summary.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Connection pool closed"
        );

        Ok(summary)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.counters.is_closed()
    }

    pub fn status(&self) -> PoolStatus {
        self.inner
            .counters
            .snapshot(&self.inner.name, self.inner.capacity, self.inner.idle())
    }
}

impl<F: ConnectionFactory> PoolInner<F> {
    /// Return a slot to the buffer. Never blocks.
    pub(crate) fn release(&self, slot: Slot<F::Connection>) {
        self.counters.record_checkin();
        match self.release_tx.try_send(slot) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(
                    pool = %self.name,
                    "Connection released after pool shutdown; dropping it"
                );
            }
            Err(TrySendError::Full(_)) => {
                tracing::error!(
                    pool = %self.name,
                    capacity = self.capacity,
                    "Pool buffer full on release; dropping connection"
                );
            }
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn counters(&self) -> &PoolCounters {
        &self.counters
    }

    fn idle(&self) -> usize {
        self.release_tx.max_capacity() - self.release_tx.capacity()
    }

    /// Close a replaced connection on a detached task.
    fn retire(self: &Arc<Self>, conn: F::Connection) {
        self.retiring.fetch_add(1, Ordering::AcqRel);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.close_connection(conn).await;
            if inner.retiring.fetch_sub(1, Ordering::AcqRel) == 1 {
                inner.retired.notify_waiters();
            }
        });
    }

    async fn wait_retired(&self) {
        loop {
            // Registered before the load so a concurrent notify is not missed
            let notified = self.retired.notified();
            if self.retiring.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Close one connection. Returns whether the driver reported success.
    async fn close_connection(&self, conn: F::Connection) -> bool {
        match self.factory.close(conn).await {
            Ok(()) => {
                self.counters.record_closed();
                PoolMetrics::record_closed(&self.name);
                true
            }
            Err(e) => {
                tracing::warn!(pool = %self.name, error = %e, "Failed to close connection");
                false
            }
        }
    }

    async fn open_replacement(&self) -> Result<F::Connection, PoolError> {
        match self.factory.connect().await {
            Ok(conn) => {
                self.counters.record_opened();
                PoolMetrics::record_opened(&self.name);
                tracing::info!(pool = %self.name, "Replaced broken connection");
                Ok(conn)
            }
            Err(e) => {
                tracing::warn!(
                    pool = %self.name,
                    target = %self.factory.describe(),
                    error = %e,
                    "Failed to open replacement connection"
                );
                Err(PoolError::Replace(Box::new(e)))
            }
        }
    }
}

impl<F: ConnectionFactory> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("acquire_timeout", &self.inner.acquire_timeout)
            .field("closed", &self.inner.counters.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFactory;
    use futures::FutureExt;
    use std::collections::HashSet;
    use tokio_test::{assert_pending, assert_ready, task};

    async fn pool_of(capacity: usize) -> (ConnectionPool<MemoryFactory>, MemoryFactory) {
        let factory = MemoryFactory::new();
        let pool = ConnectionPool::connect(factory.clone(), PoolOptions::new(capacity).name("test"))
            .await
            .unwrap();
        (pool, factory)
    }

    #[tokio::test]
    async fn test_connect_opens_exactly_capacity() {
        let (pool, factory) = pool_of(5).await;

        assert_eq!(factory.opened(), 5);
        let status = pool.status();
        assert_eq!(status.capacity, 5);
        assert_eq!(status.idle, 5);
        assert_eq!(status.in_use, 0);
        assert_eq!(status.opened_total, 5);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_rejected() {
        let factory = MemoryFactory::new();
        let err = ConnectionPool::connect(factory.clone(), PoolOptions::new(0))
            .await
            .unwrap_err();

        assert!(matches!(err, PoolError::ZeroCapacity));
        assert_eq!(factory.opened(), 0);
    }

    #[tokio::test]
    async fn test_failed_construction_closes_opened_connections() {
        let factory = MemoryFactory::new().failing_at(3);
        let err = ConnectionPool::connect(factory.clone(), PoolOptions::new(5))
            .await
            .unwrap_err();

        match err {
            PoolError::Open {
                index, capacity, ..
            } => {
                assert_eq!(index, 3);
                assert_eq!(capacity, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(factory.opened(), 3);
        assert_eq!(factory.closed(), 3);
        assert_eq!(factory.max_close_count(), 1);
    }

    #[tokio::test]
    async fn test_capacity_connections_available_before_blocking() {
        for capacity in [1, 3, 10] {
            let (pool, _factory) = pool_of(capacity).await;

            let mut held = Vec::new();
            for _ in 0..capacity {
                let conn = pool.acquire().now_or_never();
                held.push(conn.expect("acquire should not block").unwrap());
            }

            let mut next = task::spawn(pool.acquire());
            assert_pending!(next.poll());
            assert_eq!(pool.status().in_use, capacity);

            drop(held);
        }
    }

    #[tokio::test]
    async fn test_acquire_blocks_until_release() {
        let (pool, _factory) = pool_of(1).await;

        let first = pool.acquire().await.unwrap();
        let first_id = first.id();

        let mut waiter = task::spawn(pool.acquire());
        assert_pending!(waiter.poll());
        assert_eq!(pool.status().waiting, 1);

        drop(first);
        assert!(waiter.is_woken());

        let second = assert_ready!(waiter.poll()).unwrap();
        assert_eq!(second.id(), first_id);
        assert_eq!(pool.status().waiting, 0);
    }

    #[tokio::test]
    async fn test_acquire_after_release_does_not_block() {
        let (pool, _factory) = pool_of(2).await;

        for _ in 0..20 {
            let conn = pool
                .acquire()
                .now_or_never()
                .expect("acquire should be immediate")
                .unwrap();
            conn.release();
        }

        let status = pool.status();
        assert_eq!(status.idle, 2);
        assert_eq!(status.in_use, 0);
        assert_eq!(status.acquired_total, 20);
    }

    #[tokio::test]
    async fn test_concurrent_holders_get_distinct_connections() {
        let (pool, _factory) = pool_of(4).await;

        let held: Vec<_> = futures::future::join_all((0..4).map(|_| pool.acquire()))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        let ids: HashSet<u64> = held.iter().map(|c| c.id()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn test_acquire_timeout_when_exhausted() {
        let (pool, _factory) = pool_of(1).await;
        let _held = pool.acquire().await.unwrap();

        let err = pool
            .acquire_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, PoolError::Timeout(_)));
        let status = pool.status();
        assert_eq!(status.timeouts_total, 1);
        assert_eq!(status.waiting, 0);
    }

    #[tokio::test]
    async fn test_configured_timeout_applies_to_acquire() {
        let factory = MemoryFactory::new();
        let options = PoolOptions::new(1).acquire_timeout(Duration::from_millis(10));
        let pool = ConnectionPool::connect(factory, options).await.unwrap();
        let _held = pool.acquire().await.unwrap();

        assert!(matches!(
            pool.acquire().await.unwrap_err(),
            PoolError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_acquire_does_not_lose_capacity() {
        let (pool, _factory) = pool_of(1).await;
        let held = pool.acquire().await.unwrap();

        let mut waiter = task::spawn(pool.acquire());
        assert_pending!(waiter.poll());
        drop(waiter);

        drop(held);
        let again = pool.acquire().now_or_never().expect("slot should be back");
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_broken_connection_is_replaced_on_next_acquire() {
        let (pool, factory) = pool_of(1).await;

        let mut conn = pool.acquire().await.unwrap();
        let broken_id = conn.id();
        conn.mark_broken();
        drop(conn);

        let replacement = pool.acquire().await.unwrap();
        assert_ne!(replacement.id(), broken_id);
        assert!(!replacement.is_marked_broken());
        assert_eq!(factory.opened(), 2);
        assert_eq!(pool.capacity(), 1);
        drop(replacement);

        let summary = pool.close().await.unwrap();
        assert_eq!(summary.closed, 1);
        assert_eq!(factory.close_count_for(broken_id), 1);
        assert_eq!(factory.closed(), 2);
        assert_eq!(factory.max_close_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_close_of_broken_connection_survives_acquire_timeout() {
        let factory = MemoryFactory::new().with_close_delay(Duration::from_millis(100));
        let pool = ConnectionPool::connect(factory.clone(), PoolOptions::new(1))
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let broken_id = conn.id();
        conn.mark_broken();
        drop(conn);

        // The close outlives this deadline; the acquire itself does not wait on it
        let replacement = pool.acquire_timeout(Duration::from_millis(10)).await.unwrap();
        assert_ne!(replacement.id(), broken_id);
        drop(replacement);

        let summary = pool.close().await.unwrap();
        assert_eq!(
            summary,
            CloseSummary {
                closed: 1,
                failed: 0
            }
        );
        assert_eq!(factory.opened(), 2);
        assert_eq!(factory.closed(), 2);
        assert_eq!(factory.close_count_for(broken_id), 1);
    }

    #[tokio::test]
    async fn test_timeout_while_replacing_keeps_broken_connection() {
        let factory = MemoryFactory::new();
        let pool = ConnectionPool::connect(factory.clone(), PoolOptions::new(1))
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let broken_id = conn.id();
        conn.mark_broken();
        drop(conn);

        factory.set_connect_delay(Duration::from_millis(100));
        let err = pool
            .acquire_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Timeout(_)));
        assert_eq!(pool.status().idle, 1);
        assert_eq!(factory.close_count_for(broken_id), 0);

        let summary = pool.close().await.unwrap();
        assert_eq!(
            summary,
            CloseSummary {
                closed: 1,
                failed: 0
            }
        );
        assert_eq!(factory.close_count_for(broken_id), 1);
    }

    #[tokio::test]
    async fn test_failed_replacement_keeps_slot() {
        let (pool, factory) = pool_of(1).await;

        let mut conn = pool.acquire().await.unwrap();
        conn.mark_broken();
        drop(conn);

        factory.set_refuse_connections(true);
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::Replace(_)));
        assert_eq!(pool.status().idle, 1);
        assert_eq!(factory.closed(), 0);

        factory.set_refuse_connections(false);
        let replacement = pool.acquire().await.unwrap();
        assert!(!replacement.is_marked_broken());
        assert_eq!(factory.opened(), 2);
    }

    #[tokio::test]
    async fn test_close_reclaims_and_closes_every_connection() {
        let (pool, factory) = pool_of(3).await;

        let held: Vec<_> = futures::future::join_all((0..3).map(|_| pool.acquire()))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        drop(held);

        let summary = pool.close().await.unwrap();
        assert_eq!(
            summary,
            CloseSummary {
                closed: 3,
                failed: 0
            }
        );
        assert_eq!(factory.closed(), 3);
        assert_eq!(factory.max_close_count(), 1);
        assert!(pool.is_closed());
        assert_eq!(pool.status().idle, 0);
    }

    #[tokio::test]
    async fn test_close_waits_for_outstanding_connections() {
        let (pool, factory) = pool_of(2).await;
        let held = pool.acquire().await.unwrap();

        let mut closing = task::spawn(pool.close());
        assert_pending!(closing.poll());
        assert_eq!(factory.closed(), 1);

        drop(held);
        assert!(closing.is_woken());
        let summary = assert_ready!(closing.poll()).unwrap();
        assert_eq!(summary.closed, 2);
        assert_eq!(factory.closed(), 2);
    }

    #[tokio::test]
    async fn test_acquire_after_close_fails() {
        let (pool, _factory) = pool_of(2).await;
        pool.close().await.unwrap();

        assert!(matches!(pool.acquire().await.unwrap_err(), PoolError::Closed));
        assert!(matches!(pool.close().await.unwrap_err(), PoolError::AlreadyClosed));
    }

    #[tokio::test]
    async fn test_with_connection_releases_on_error() {
        #[derive(Debug)]
        enum TestError {
            Pool,
            Query,
        }
        impl From<PoolError> for TestError {
            fn from(_: PoolError) -> Self {
                TestError::Pool
            }
        }

        let (pool, _factory) = pool_of(1).await;

        let result: Result<(), TestError> = pool
            .with_connection(|_conn| Box::pin(async { Err(TestError::Query) }))
            .await;
        assert!(matches!(result, Err(TestError::Query)));

        let id: Result<u64, TestError> = pool
            .with_connection(|conn| Box::pin(async move { Ok(conn.id()) }))
            .await;
        assert!(id.is_ok());
        assert_eq!(pool.status().in_use, 0);
    }
}
