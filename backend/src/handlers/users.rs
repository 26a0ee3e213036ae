use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use serde::Deserialize;

use super::{block, AppJson, AppPath, AppState};
use crate::accounting::{self, PortfolioSummary};
use crate::auth::{self, AuthUser};
use crate::error::ApiError;
use crate::models::{Money, NewUser, User};
use crate::storage::StorageError;

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    amount: Money,
}

pub async fn register(
    State(state): State<AppState>,
    AppJson(mut new_user): AppJson<NewUser>,
) -> Result<(StatusCode, AppJson<User>), ApiError> {
    new_user.username = new_user.username.trim().to_string();
    new_user.email = new_user.email.trim().to_string();
    new_user.validate().map_err(ApiError::invalid)?;
    let password = std::mem::take(&mut new_user.password);
    new_user.password = tokio::task::spawn_blocking(move || auth::hash_password(&password)).await??;

    let user = block(&state, move |store| store.create_user(new_user)).await?;
    Ok((StatusCode::CREATED, AppJson(user)))
}

pub async fn get(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<User>, ApiError> {
    let user = block(&state, move |store| store.get_user(id))
        .await?
        .ok_or(StorageError::not_found("User", id))?;
    Ok(AppJson(user))
}

pub async fn portfolio(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<PortfolioSummary>, ApiError> {
    let multiplier = state.config.appreciation_multiplier;
    let summary = block(&state, move |store| {
        store.get_user(id)?.ok_or(StorageError::not_found("User", id))?;
        let investments = store.list_investments_by_user(id)?;
        let transactions = store.list_token_transactions_by_user(id)?;
        Ok(accounting::portfolio(id, &investments, &transactions, multiplier))
    })
    .await?;
    Ok(AppJson(summary))
}

pub async fn deposit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(id): AppPath<i64>,
    AppJson(request): AppJson<DepositRequest>,
) -> Result<AppJson<User>, ApiError> {
    if !auth_user.may_access(id) {
        return Err(ApiError::Forbidden("Cannot deposit into another user's wallet".into()));
    }
    if !request.amount.is_positive() {
        return Err(ApiError::invalid_field("amount", "must be greater than 0"));
    }
    let user = block(&state, move |store| store.deposit(id, request.amount)).await?;
    Ok(AppJson(user))
}
