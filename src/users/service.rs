use std::sync::Arc;

use thiserror::Error;

use super::password::{hash_password, verify_password, PasswordError};
use super::store::{StoreError, UserStore};
use super::types::{AuthResponse, CreateUserRequest, CreatedUser, LoginRequest, NewUser};
use crate::metrics::UserMetrics;
use crate::shard::RouteError;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("user {0} already exists")]
    Duplicate(String),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for UserError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(name) => UserError::Duplicate(name),
            StoreError::Route(RouteError::EmptyKey) => {
                UserError::Validation("username must not be empty".to_string())
            }
            other => UserError::Store(other),
        }
    }
}

impl UserError {
    fn outcome(&self) -> &'static str {
        match self {
            UserError::Validation(_) => "invalid",
            UserError::InvalidCredentials => "denied",
            UserError::Duplicate(_) => "duplicate",
            UserError::Password(_) | UserError::Store(_) => "error",
        }
    }
}

/// Registration and login on top of a sharded [`UserStore`].
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Hash the password and insert the user on its shard.
    pub async fn register(&self, request: CreateUserRequest) -> Result<CreatedUser, UserError> {
        let result = self.register_inner(request).await;
        match &result {
            Ok(_) => UserMetrics::record_register("created"),
            Err(e) => UserMetrics::record_register(e.outcome()),
        }
        result
    }

    async fn register_inner(&self, request: CreateUserRequest) -> Result<CreatedUser, UserError> {
        let CreateUserRequest {
            username,
            email,
            password,
        } = request;

        if username.is_empty() {
            return Err(UserError::Validation("username must not be empty".to_string()));
        }
        if password.is_empty() {
            return Err(UserError::Validation("password must not be empty".to_string()));
        }

        let password_hash = hash_blocking(password).await?;
        let user = NewUser {
            username,
            email,
            password_hash,
        };
        let shard = self.store.insert_user(&user).await?;

        Ok(CreatedUser {
            username: user.username,
            email: user.email,
            shard,
        })
    }

    /// Check the password against the hash stored on the user's shard.
    ///
    /// Unknown users, wrong passwords and unreadable stored hashes all come
    /// back as [`UserError::InvalidCredentials`].
    pub async fn authenticate(&self, request: LoginRequest) -> Result<AuthResponse, UserError> {
        let result = self.authenticate_inner(request).await;
        match &result {
            Ok(_) => UserMetrics::record_login("ok"),
            Err(e) => UserMetrics::record_login(e.outcome()),
        }
        result
    }

    async fn authenticate_inner(&self, request: LoginRequest) -> Result<AuthResponse, UserError> {
        let LoginRequest { username, password } = request;
        if username.is_empty() {
            return Err(UserError::Validation("username must not be empty".to_string()));
        }

        let (shard, stored) = self.store.password_hash(&username).await?;
        let Some(stored) = stored else {
            tracing::debug!(username = %username, shard = %shard, "Login for unknown user");
            return Err(UserError::InvalidCredentials);
        };

        match verify_blocking(password, stored).await {
            Ok(true) => Ok(AuthResponse { username, shard }),
            Ok(false) => Err(UserError::InvalidCredentials),
            Err(e) => {
                tracing::warn!(username = %username, shard = %shard, error = %e, "Stored password hash unreadable");
                Err(UserError::InvalidCredentials)
            }
        }
    }
}

// Argon2 is deliberately slow; keep it off the async workers.
async fn hash_blocking(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| PasswordError::Hash(e.to_string()))?
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| PasswordError::Hash(e.to_string()))?
}
