use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use super::{block, AppJson, AppPath, AppQuery, AppState};
use crate::error::ApiError;
use crate::models::{NewTokenTransaction, TokenTransaction};
use crate::property::parse_price_range;
use crate::storage::StorageError;
use crate::transaction::{self, Listing, StatusChangeRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    property_id: Option<i64>,
    user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    property_id: Option<i64>,
    price_range: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    AppJson(new_transaction): AppJson<NewTokenTransaction>,
) -> Result<(StatusCode, AppJson<TokenTransaction>), ApiError> {
    new_transaction.validate().map_err(ApiError::invalid)?;
    let created = block(&state, move |store| store.create_token_transaction(new_transaction)).await?;
    Ok((StatusCode::CREATED, AppJson(created)))
}

pub async fn get(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<TokenTransaction>, ApiError> {
    let transaction = block(&state, move |store| store.get_token_transaction(id))
        .await?
        .ok_or(StorageError::not_found("Token transaction", id))?;
    Ok(AppJson(transaction))
}

/// `propertyId` wins when both parameters are given.
pub async fn list(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<TransactionQuery>,
) -> Result<AppJson<Vec<TokenTransaction>>, ApiError> {
    let transactions = match (query.property_id, query.user_id) {
        (Some(property_id), _) => {
            block(&state, move |store| store.list_token_transactions_by_property(property_id)).await?
        }
        (None, Some(user_id)) => {
            block(&state, move |store| store.list_token_transactions_by_user(user_id)).await?
        }
        (None, None) => {
            return Err(ApiError::bad_request("Missing propertyId or userId query parameter"));
        }
    };
    Ok(AppJson(transactions))
}

pub async fn update_status(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(request): AppJson<StatusChangeRequest>,
) -> Result<AppJson<TokenTransaction>, ApiError> {
    let change = request.parse().ok_or_else(|| {
        ApiError::invalid_field("status", "must be one of pending, completed, cancelled")
    })?;
    let updated = block(&state, move |store| store.update_token_transaction_status(id, change)).await?;
    Ok(AppJson(updated))
}

/// Open marketplace listings, optionally narrowed to one property and a
/// total-price range.
pub async fn listings(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListingQuery>,
) -> Result<AppJson<Vec<Listing>>, ApiError> {
    let range = parse_price_range(query.price_range.as_deref())
        .map_err(|e| ApiError::invalid_field("priceRange", e.to_string()))?;
    let open = block(&state, |store| store.list_open_listings()).await?;
    let listings = open
        .iter()
        .filter(|tx| query.property_id.map_or(true, |id| tx.property_id == id))
        .filter_map(transaction::open_listing)
        .filter(|listing| range.map_or(true, |r| r.contains(listing.total_price)))
        .collect();
    Ok(AppJson(listings))
}
