use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;
use thiserror::Error;

use crate::config::DbConfig;
use crate::pool::ConnectionFactory;
use crate::workload::Operation;

#[derive(Debug, Error)]
pub enum PgDriverError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Opens unpooled `PgConnection`s for a [`ConnectionPool`](crate::pool::ConnectionPool).
#[derive(Clone)]
pub struct PgConnectionFactory {
    options: PgConnectOptions,
    target: String,
}

impl PgConnectionFactory {
    pub fn new(config: &DbConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database)
            .ssl_mode(PgSslMode::Disable);

        Self {
            options,
            target: config.masked(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    type Connection = PgConnection;
    type Error = PgDriverError;

    async fn connect(&self) -> Result<PgConnection, PgDriverError> {
        let conn = PgConnection::connect_with(&self.options).await?;
        tracing::debug!(target_db = %self.target, "PostgreSQL connection opened");
        Ok(conn)
    }

    async fn close(&self, conn: PgConnection) -> Result<(), PgDriverError> {
        conn.close().await?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}

impl std::fmt::Debug for PgConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnectionFactory")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// `SELECT 1`, reading every returned row.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectOne;

#[async_trait]
impl Operation<PgConnection> for SelectOne {
    type Error = PgDriverError;

    async fn run(&self, conn: &mut PgConnection) -> Result<(), PgDriverError> {
        let rows: Vec<i32> = sqlx::query_scalar("SELECT 1").fetch_all(&mut *conn).await?;
        tracing::trace!(rows = rows.len(), "SELECT 1 complete");
        Ok(())
    }
}
