use axum::extract::State;
use axum::http::StatusCode;

use super::{block, AppJson, AppPath, AppState};
use crate::error::ApiError;
use crate::models::{Investment, NewInvestment};
use crate::storage::StorageError;

pub async fn create(
    State(state): State<AppState>,
    AppJson(new_investment): AppJson<NewInvestment>,
) -> Result<(StatusCode, AppJson<Investment>), ApiError> {
    new_investment.validate().map_err(ApiError::invalid)?;
    let investment = block(&state, move |store| store.create_investment(new_investment)).await?;
    Ok((StatusCode::CREATED, AppJson(investment)))
}

pub async fn get(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<Investment>, ApiError> {
    let investment = block(&state, move |store| store.get_investment(id))
        .await?
        .ok_or(StorageError::not_found("Investment", id))?;
    Ok(AppJson(investment))
}

pub async fn list_for_user(
    State(state): State<AppState>,
    AppPath(user_id): AppPath<i64>,
) -> Result<AppJson<Vec<Investment>>, ApiError> {
    let investments = block(&state, move |store| store.list_investments_by_user(user_id)).await?;
    Ok(AppJson(investments))
}

pub async fn list_for_property(
    State(state): State<AppState>,
    AppPath(property_id): AppPath<i64>,
) -> Result<AppJson<Vec<Investment>>, ApiError> {
    let investments =
        block(&state, move |store| store.list_investments_by_property(property_id)).await?;
    Ok(AppJson(investments))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use crate::accounting::AmountPolicy;
    use crate::config::AppConfig;
    use crate::handlers::test_support::{app, app_with, create_property, register, send};

    fn body(user: &Value, property: &Value, percentage: i64, amount: i64) -> Value {
        json!({
            "userId": user["id"],
            "propertyId": property["id"],
            "percentage": percentage,
            "amount": amount
        })
    }

    #[tokio::test]
    async fn below_minimum_is_rejected() {
        let app = app();
        let user = register(&app, "bob").await;
        let property = create_property(&app, 45).await;

        let (status, error) =
            send(&app, Method::POST, "/api/investments", Some(body(&user, &property, 5, 30000)), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error["message"].as_str().unwrap().contains("minimum"));
    }

    #[tokio::test]
    async fn oversell_is_rejected_and_state_kept() {
        let app = app();
        let user = register(&app, "carol").await;
        let property = create_property(&app, 10).await;

        let (status, _) =
            send(&app, Method::POST, "/api/investments", Some(body(&user, &property, 12, 72000)), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/api/properties/{}", property["id"]);
        let (_, property) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(property["availableTokens"], json!(10));
        let uri = format!("/api/properties/{}/investments", property["id"]);
        let (_, investments) = send(&app, Method::GET, &uri, None, None).await;
        assert!(investments.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_investment_by_id() {
        let app = app();
        let user = register(&app, "ruth").await;
        let property = create_property(&app, 45).await;
        let (status, created) =
            send(&app, Method::POST, "/api/investments", Some(body(&user, &property, 10, 60000)), None).await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/investments/{}", created["id"]);
        let (status, fetched) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (status, _) = send(&app, Method::GET, "/api/investments/999", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_references_are_not_found() {
        let app = app();
        let user = register(&app, "dave").await;
        let ghost = json!({ "id": 404 });

        let (status, _) =
            send(&app, Method::POST, "/api/investments", Some(body(&user, &ghost, 10, 60000)), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let property = create_property(&app, 45).await;
        let (status, _) =
            send(&app, Method::POST, "/api/investments", Some(body(&ghost, &property, 10, 60000)), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn match_price_policy() {
        let mut config = AppConfig::testing();
        config.amount_policy = AmountPolicy::MatchPrice;
        let app = app_with(config);
        let user = register(&app, "erin").await;
        let property = create_property(&app, 45).await;

        let (status, _) =
            send(&app, Method::POST, "/api/investments", Some(body(&user, &property, 10, 50000)), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) =
            send(&app, Method::POST, "/api/investments", Some(body(&user, &property, 10, 60000)), None).await;
        assert_eq!(status, StatusCode::CREATED);
    }
}
