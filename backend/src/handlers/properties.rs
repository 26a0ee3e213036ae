use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use super::{block, AppJson, AppPath, AppQuery, AppState};
use crate::accounting::{self, OwnershipBreakdown};
use crate::error::ApiError;
use crate::models::{NewProperty, Property, PropertyStatus};
use crate::property::PropertyQuery;
use crate::storage::StorageError;

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    status: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PropertyQuery>,
) -> Result<AppJson<Vec<Property>>, ApiError> {
    let filter = query.parse().map_err(ApiError::invalid)?;
    let status = filter.status;
    let properties = block(&state, move |store| match status {
        Some(status) => store.list_properties_by_status(status),
        None => store.list_properties(),
    })
    .await?;
    Ok(AppJson(filter.apply(properties)))
}

pub async fn get(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<Property>, ApiError> {
    let property = block(&state, move |store| store.get_property(id))
        .await?
        .ok_or(StorageError::not_found("Property", id))?;
    Ok(AppJson(property))
}

pub async fn create(
    State(state): State<AppState>,
    AppJson(new_property): AppJson<NewProperty>,
) -> Result<(StatusCode, AppJson<Property>), ApiError> {
    new_property.validate().map_err(ApiError::invalid)?;
    let property = block(&state, move |store| store.create_property(new_property)).await?;
    Ok((StatusCode::CREATED, AppJson(property)))
}

pub async fn update_status(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(request): AppJson<StatusRequest>,
) -> Result<AppJson<Property>, ApiError> {
    let status: PropertyStatus = request
        .status
        .as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ApiError::invalid_field("status", "must be one of active, pending, sold"))?;
    let property = block(&state, move |store| store.update_property_status(id, status)).await?;
    Ok(AppJson(property))
}

pub async fn ownership(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<OwnershipBreakdown>, ApiError> {
    let breakdown = block(&state, move |store| {
        let property = store
            .get_property(id)?
            .ok_or(StorageError::not_found("Property", id))?;
        let investments = store.list_investments_by_property(id)?;
        Ok(accounting::ownership(&property, &investments))
    })
    .await?;
    Ok(AppJson(breakdown))
}
