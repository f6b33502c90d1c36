//! In-memory driver for exercising pools, shards and the user API without a
//! running database.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::pool::ConnectionFactory;
use crate::users::{NewUser, StoreError, UserConnection};
use crate::workload::Operation;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("connection attempt {0} refused")]
    Refused(usize),

    #[error("query failed: {0}")]
    Query(String),
}

/// Table storage shared by every connection of one factory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    users: DashMap<String, NewUser>,
    schema_ready: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn schema_ready(&self) -> bool {
        self.schema_ready.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct FactoryState {
    attempts: AtomicUsize,
    next_id: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
    close_counts: DashMap<u64, usize>,
    refuse: AtomicBool,
    connect_delay_ms: AtomicU64,
    close_delay_ms: AtomicU64,
}

/// Factory producing [`MemoryConnection`]s. Clones share counters and storage.
#[derive(Debug, Clone)]
pub struct MemoryFactory {
    state: Arc<FactoryState>,
    backend: Arc<MemoryBackend>,
    fail_at: Option<usize>,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    pub fn with_backend(backend: Arc<MemoryBackend>) -> Self {
        Self {
            state: Arc::new(FactoryState::default()),
            backend,
            fail_at: None,
        }
    }

    /// Refuse the connection attempt with this zero-based index.
    pub fn failing_at(mut self, attempt: usize) -> Self {
        self.fail_at = Some(attempt);
        self
    }

    /// Make every close call take `delay` before it completes.
    pub fn with_close_delay(self, delay: Duration) -> Self {
        self.state
            .close_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Make later connection attempts take `delay` before they complete.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state
            .connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Refuse every connection attempt while set.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn close_count_for(&self, id: u64) -> usize {
        self.state.close_counts.get(&id).map(|c| *c).unwrap_or(0)
    }

    /// Highest number of times any single connection was closed.
    pub fn max_close_count(&self) -> usize {
        self.state
            .close_counts
            .iter()
            .map(|entry| *entry.value())
            .max()
            .unwrap_or(0)
    }

    pub fn backend(&self) -> Arc<MemoryBackend> {
        Arc::clone(&self.backend)
    }
}

impl Default for MemoryFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionFactory for MemoryFactory {
    type Connection = MemoryConnection;
    type Error = MemoryError;

    async fn connect(&self) -> Result<MemoryConnection, MemoryError> {
        pause(&self.state.connect_delay_ms).await;
        let attempt = self.state.attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.refuse.load(Ordering::SeqCst) || self.fail_at == Some(attempt) {
            return Err(MemoryError::Refused(attempt));
        }

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            id,
            queries: 0,
            backend: Arc::clone(&self.backend),
        })
    }

    async fn close(&self, conn: MemoryConnection) -> Result<(), MemoryError> {
        pause(&self.state.close_delay_ms).await;
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        *self.state.close_counts.entry(conn.id).or_insert(0) += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

async fn pause(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    id: u64,
    queries: u64,
    backend: Arc<MemoryBackend>,
}

impl MemoryConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Count one query against this connection.
    pub fn touch(&mut self) {
        self.queries += 1;
    }

    pub fn queries(&self) -> u64 {
        self.queries
    }
}

#[async_trait]
impl UserConnection for MemoryConnection {
    async fn ensure_schema(&mut self) -> Result<(), StoreError> {
        self.touch();
        self.backend.schema_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<(), StoreError> {
        self.touch();
        match self.backend.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(user.username.clone())),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(())
            }
        }
    }

    async fn password_hash(&mut self, username: &str) -> Result<Option<String>, StoreError> {
        self.touch();
        Ok(self
            .backend
            .users
            .get(username)
            .map(|user| user.password_hash.clone()))
    }
}

/// Stand-in for a `SELECT 1` round trip.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    delay: Option<Duration>,
    fail: bool,
}

impl MemoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Operation<MemoryConnection> for MemoryQuery {
    type Error = MemoryError;

    async fn run(&self, conn: &mut MemoryConnection) -> Result<(), MemoryError> {
        conn.touch();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(MemoryError::Query(format!(
                "query on connection {} failed",
                conn.id()
            )));
        }
        Ok(())
    }
}
