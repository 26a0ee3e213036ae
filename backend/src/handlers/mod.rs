use axum::extract::{FromRequest, FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;

use crate::auth;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::storage::{Storage, StorageError};

mod consultations;
mod investments;
mod properties;
mod session;
mod token_transactions;
mod users;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Storage>,
}

/// JSON body extractor whose rejection is a 400 `ApiError`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

impl<T: Serialize> IntoResponse for AppJson<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);

/// Runs a storage call on the blocking pool; both backends block.
pub async fn block<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&dyn Storage) -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    let result = tokio::task::spawn_blocking(move || f(store.as_ref())).await?;
    Ok(result?)
}

async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;
    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header format".into()))?;
    let user = auth::validate_token(token, &state.config.jwt_secret).map_err(|e| {
        log::warn!("Rejected bearer token: {}", e);
        ApiError::from(e)
    })?;
    log::info!("Authenticated user {} for {}", user.id, request.uri().path());
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn health() -> &'static str {
    "healthy"
}

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/current-user", get(session::current_user))
        .route("/api/users/:id/consultations", get(consultations::list_for_user))
        .route("/api/consultations/:id", get(consultations::get))
        .route("/api/users/:id/wallet/deposit", post(users::deposit))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/", get(|| async { "Hello, Fractional Real Estate Marketplace!" }))
        .route("/health", get(health))
        .route("/api/login", post(session::login))
        .route("/api/logout", post(session::logout))
        .route("/api/properties", get(properties::list).post(properties::create))
        .route("/api/properties/:id", get(properties::get))
        .route("/api/properties/:id/status", patch(properties::update_status))
        .route("/api/properties/:id/ownership", get(properties::ownership))
        .route("/api/properties/:id/investments", get(investments::list_for_property))
        .route("/api/users", post(users::register))
        .route("/api/users/:id", get(users::get))
        .route("/api/users/:id/investments", get(investments::list_for_user))
        .route("/api/users/:id/portfolio", get(users::portfolio))
        .route("/api/investments", post(investments::create))
        .route("/api/investments/:id", get(investments::get))
        .route(
            "/api/token-transactions",
            get(token_transactions::list).post(token_transactions::create),
        )
        .route("/api/token-transactions/:id", get(token_transactions::get))
        .route(
            "/api/token-transactions/:id/status",
            patch(token_transactions::update_status),
        )
        .route("/api/marketplace/listings", get(token_transactions::listings))
        .route("/api/consultations", post(consultations::create))
        .route("/api/consultations/:id/status", patch(consultations::update_status))
        .merge(protected_routes)
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt; // for `collect`
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use super::{router, AppState};
    use crate::config::AppConfig;
    use crate::storage::MemStorage;

    pub fn app() -> Router {
        app_with(AppConfig::testing())
    }

    pub fn app_with(config: AppConfig) -> Router {
        let policy = config.policy();
        router(AppState {
            config: Arc::new(config),
            store: Arc::new(MemStorage::new(policy)),
        })
    }

    pub async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn register(app: &Router, username: &str) -> Value {
        let (status, user) = send(
            app,
            Method::POST,
            "/api/users",
            Some(json!({
                "username": username,
                "password": "correct-horse",
                "email": format!("{username}@example.com"),
                "isInvestor": true
            })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{user}");
        user
    }

    pub async fn login(app: &Router, username: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/login",
            Some(json!({ "username": username, "password": "correct-horse" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    pub fn property_payload(available_tokens: i64) -> Value {
        json!({
            "title": "Modern Downtown Condo",
            "address": "123 Main St",
            "city": "San Francisco",
            "state": "CA",
            "zipCode": "94105",
            "price": 600000,
            "bedrooms": 2,
            "bathrooms": 2,
            "squareFeet": 1200,
            "propertyType": "condo",
            "availableTokens": available_tokens,
            "minimumInvestment": 10
        })
    }

    pub async fn create_property(app: &Router, available_tokens: i64) -> Value {
        let (status, property) = send(
            app,
            Method::POST,
            "/api/properties",
            Some(property_payload(available_tokens)),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{property}");
        property
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use super::test_support::{app, create_property, register, send};

    #[tokio::test]
    async fn health_and_greeting() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("healthy".into()));

        let (status, _) = send(&app, Method::GET, "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn buying_a_stake_end_to_end() {
        let app = app();
        let user = register(&app, "alice").await;
        let property = create_property(&app, 45).await;
        let (user_id, property_id) = (user["id"].as_i64().unwrap(), property["id"].as_i64().unwrap());
        assert_eq!(property["availableTokens"], json!(45));

        let (status, investment) = send(
            &app,
            Method::POST,
            "/api/investments",
            Some(json!({
                "userId": user_id,
                "propertyId": property_id,
                "percentage": 10,
                "amount": 60000
            })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{investment}");

        let (status, property) =
            send(&app, Method::GET, &format!("/api/properties/{property_id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(property["availableTokens"], json!(35));

        let (status, investments) =
            send(&app, Method::GET, &format!("/api/users/{user_id}/investments"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        let investments = investments.as_array().unwrap();
        assert_eq!(investments.len(), 1);
        assert_eq!(investments[0]["percentage"], json!(10));
        assert_eq!(investments[0]["amount"], json!(60000));
        assert_eq!(investments[0]["propertyId"], json!(property_id));
    }

    #[tokio::test]
    async fn malformed_ids_and_bodies_are_bad_requests() {
        let app = app();
        let (status, _) = send(&app, Method::GET, "/api/properties/abc", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::GET, "/api/properties/999", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/investments",
            Some(json!({ "userId": 1, "percentage": "ten" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }
}
