use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use serde::{Deserialize, Serialize};

use super::{block, AppJson, AppState};
use crate::auth::{self, AuthUser};
use crate::error::ApiError;
use crate::models::User;
use crate::storage::StorageError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    token: String,
    user: User,
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<AppJson<LoginResponse>, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid username or password".into());
    let identifier = request.username.trim().to_string();
    let user = block(&state, move |store| match store.get_user_by_username(&identifier)? {
        Some(user) => Ok(Some(user)),
        None if identifier.contains('@') => store.get_user_by_email(&identifier),
        None => Ok(None),
    })
    .await?
    .ok_or_else(invalid)?;

    let stored_hash = user.password.clone();
    let verified =
        tokio::task::spawn_blocking(move || auth::verify_password(&request.password, &stored_hash)).await?;
    if !verified {
        log::warn!("Failed login for {}", user.username);
        return Err(invalid());
    }

    let token = auth::create_token(&user, &state.config.jwt_secret, state.config.token_ttl_hours)?;
    log::info!("User {} logged in", user.id);
    Ok(AppJson(LoginResponse { token, user }))
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn current_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<AppJson<User>, ApiError> {
    let user = block(&state, move |store| store.get_user(auth_user.id))
        .await?
        .ok_or(StorageError::not_found("User", auth_user.id))?;
    Ok(AppJson(user))
}
