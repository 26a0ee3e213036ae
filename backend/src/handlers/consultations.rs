use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use serde::Deserialize;

use super::{block, AppJson, AppPath, AppState};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{Consultation, ConsultationStatus, NewConsultation};
use crate::storage::StorageError;

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    status: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    AppJson(new_consultation): AppJson<NewConsultation>,
) -> Result<(StatusCode, AppJson<Consultation>), ApiError> {
    new_consultation.validate().map_err(ApiError::invalid)?;
    let created = block(&state, move |store| store.create_consultation(new_consultation)).await?;
    Ok((StatusCode::CREATED, AppJson(created)))
}

/// Visible to the booking user and admins only.
pub async fn get(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<Consultation>, ApiError> {
    let consultation = block(&state, move |store| store.get_consultation(id))
        .await?
        .ok_or(StorageError::not_found("Consultation", id))?;
    if !auth_user.may_access(consultation.user_id) {
        log::warn!("User {} denied consultation {}", auth_user.id, id);
        return Err(ApiError::Forbidden("Not allowed to view this consultation".into()));
    }
    Ok(AppJson(consultation))
}

pub async fn list_for_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(user_id): AppPath<i64>,
) -> Result<AppJson<Vec<Consultation>>, ApiError> {
    if !auth_user.may_access(user_id) {
        log::warn!("User {} denied consultations of user {}", auth_user.id, user_id);
        return Err(ApiError::Forbidden("Not allowed to view these consultations".into()));
    }
    let consultations = block(&state, move |store| store.list_consultations_by_user(user_id)).await?;
    Ok(AppJson(consultations))
}

pub async fn update_status(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(request): AppJson<StatusRequest>,
) -> Result<AppJson<Consultation>, ApiError> {
    let status: ConsultationStatus = request
        .status
        .as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            ApiError::invalid_field("status", "must be one of scheduled, completed, cancelled")
        })?;
    let updated = block(&state, move |store| store.update_consultation_status(id, status)).await?;
    Ok(AppJson(updated))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::handlers::test_support::{app, create_property, login, register, send};

    #[tokio::test]
    async fn consultations_are_private() {
        let app = app();
        let kim = register(&app, "kim").await;
        register(&app, "leo").await;
        let property = create_property(&app, 45).await;

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/consultations",
            Some(json!({
                "userId": kim["id"],
                "propertyId": property["id"],
                "type": "homebuyer",
                "notes": "Interested in living there",
                "scheduledDate": "2025-04-01T15:00:00Z"
            })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        assert_eq!(created["status"], json!("scheduled"));
        assert_eq!(created["type"], json!("homebuyer"));

        let uri = format!("/api/users/{}/consultations", kim["id"]);
        let (status, _) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let leo_token = login(&app, "leo").await;
        let (status, _) = send(&app, Method::GET, &uri, None, Some(&leo_token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let kim_token = login(&app, "kim").await;
        let (status, mine) = send(&app, Method::GET, &uri, None, Some(&kim_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::GET, &uri, None, Some("not-a-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn single_consultation_is_private() {
        let app = app();
        let owen = register(&app, "owen").await;
        register(&app, "pat").await;
        let property = create_property(&app, 45).await;
        let (_, created) = send(
            &app,
            Method::POST,
            "/api/consultations",
            Some(json!({
                "userId": owen["id"],
                "propertyId": property["id"],
                "type": "investor",
                "scheduledDate": "2025-04-03T09:00:00Z"
            })),
            None,
        )
        .await;
        let uri = format!("/api/consultations/{}", created["id"]);

        let (status, _) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let pat_token = login(&app, "pat").await;
        let (status, _) = send(&app, Method::GET, &uri, None, Some(&pat_token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let owen_token = login(&app, "owen").await;
        let (status, fetched) = send(&app, Method::GET, &uri, None, Some(&owen_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (status, _) = send(&app, Method::GET, "/api/consultations/999", None, Some(&owen_token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn consultation_status_lifecycle() {
        let app = app();
        let user = register(&app, "mia").await;
        let property = create_property(&app, 45).await;
        let (_, created) = send(
            &app,
            Method::POST,
            "/api/consultations",
            Some(json!({
                "userId": user["id"],
                "propertyId": property["id"],
                "type": "investor",
                "scheduledDate": "2025-04-02T10:30:00Z"
            })),
            None,
        )
        .await;
        let uri = format!("/api/consultations/{}/status", created["id"]);

        let (status, done) = send(&app, Method::PATCH, &uri, Some(json!({ "status": "completed" })), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["status"], json!("completed"));

        let (status, _) = send(&app, Method::PATCH, &uri, Some(json!({ "status": "cancelled" })), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn consultation_references_must_exist() {
        let app = app();
        let user = register(&app, "ned").await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/consultations",
            Some(json!({
                "userId": user["id"],
                "propertyId": 31,
                "type": "investor",
                "scheduledDate": "2025-04-02T10:30:00Z"
            })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
