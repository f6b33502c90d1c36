//! Pool bookkeeping counters and the snapshot exposed to callers.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Point-in-time view of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub name: String,
    pub capacity: usize,
    /// Slots sitting in the buffer
    pub idle: usize,
    /// Connections currently checked out by workers
    pub in_use: usize,
    /// Callers currently suspended in `acquire`
    pub waiting: usize,
    pub acquired_total: u64,
    pub opened_total: u64,
    pub closed_total: u64,
    pub timeouts_total: u64,
    pub closed: bool,
}

/// Lock-free counters shared by the pool and its guards.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub(crate) in_use: AtomicUsize,
    pub(crate) waiting: AtomicUsize,
    pub(crate) acquired_total: AtomicU64,
    pub(crate) opened_total: AtomicU64,
    pub(crate) closed_total: AtomicU64,
    pub(crate) timeouts_total: AtomicU64,
    pub(crate) closed: AtomicBool,
}

impl PoolCounters {
    pub(crate) fn record_checkout(&self) {
        self.in_use.fetch_add(1, Ordering::AcqRel);
        self.acquired_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkin(&self) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn record_opened(&self) {
        self.opened_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self) {
        self.closed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flip the closed flag. Returns `false` if it was already set.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn snapshot(&self, name: &str, capacity: usize, idle: usize) -> PoolStatus {
        PoolStatus {
            name: name.to_string(),
            capacity,
            idle,
            in_use: self.in_use.load(Ordering::Acquire),
            waiting: self.waiting.load(Ordering::Acquire),
            acquired_total: self.acquired_total.load(Ordering::Relaxed),
            opened_total: self.opened_total.load(Ordering::Relaxed),
            closed_total: self.closed_total.load(Ordering::Relaxed),
            timeouts_total: self.timeouts_total.load(Ordering::Relaxed),
            closed: self.is_closed(),
        }
    }
}

/// Keeps `waiting` accurate even when an acquire future is dropped mid-wait.
pub(crate) struct WaitingGuard<'a> {
    waiting: &'a AtomicUsize,
}

impl<'a> WaitingGuard<'a> {
    pub(crate) fn new(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::AcqRel);
        Self { waiting }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}
