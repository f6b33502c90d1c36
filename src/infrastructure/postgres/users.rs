//! `users` table queries for a raw Postgres connection.

use async_trait::async_trait;
use sqlx::postgres::PgConnection;

use crate::users::{NewUser, StoreError, UserConnection};

const CREATE_USERS_TABLE: &str = "CREATE TABLE IF NOT EXISTS users (
    id SERIAL PRIMARY KEY,
    username TEXT UNIQUE,
    email TEXT,
    password TEXT
)";

fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => StoreError::ConnectionLost(Box::new(err)),
        other => StoreError::Backend(Box::new(other)),
    }
}

#[async_trait]
impl UserConnection for PgConnection {
    async fn ensure_schema(&mut self) -> Result<(), StoreError> {
        sqlx::query(CREATE_USERS_TABLE)
            .execute(&mut *self)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<(), StoreError> {
        let result = sqlx::query("INSERT INTO users (username, email, password) VALUES ($1, $2, $3)")
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .execute(&mut *self)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate(user.username.clone()))
            }
            Err(e) => Err(store_error(e)),
        }
    }

    async fn password_hash(&mut self, username: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar::<_, Option<String>>("SELECT password FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&mut *self)
            .await
            .map(Option::flatten)
            .map_err(store_error)
    }
}
