//! Registration and login endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::users::{AuthResponse, CreateUserRequest, CreatedUser, LoginRequest};

/// POST /users - hash the password and store the user on its shard
pub async fn create_user(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedUser>)> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let created = state.users.register(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /auth - verify a username/password pair
pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let response = state.users.authenticate(request).await?;
    Ok(Json(response))
}
