use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::AuthError;
use crate::models::FieldErrors;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String, errors: FieldErrors },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// A well-formed request refused by a business rule.
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid(errors: FieldErrors) -> Self {
        ApiError::Validation {
            message: "Invalid request".into(),
            errors,
        }
    }

    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::invalid(FieldErrors::single(field, message))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            errors: FieldErrors::default(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::Rejected(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation { message, errors } if !errors.is_empty() => {
                json!({ "message": message, "errors": errors })
            }
            ApiError::Internal(detail) => {
                log::error!("Internal error: {}", detail);
                json!({ "message": "Internal server error" })
            }
            other => json!({ "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            StorageError::DuplicateUsername | StorageError::DuplicateEmail => {
                ApiError::Conflict(e.to_string())
            }
            StorageError::BelowMinimum { .. }
            | StorageError::InsufficientTokens { .. }
            | StorageError::AmountMismatch { .. }
            | StorageError::InsufficientFunds { .. }
            | StorageError::BalanceOverflow { .. }
            | StorageError::MissingBuyer
            | StorageError::SelfTrade => {
                log::warn!("Rejected: {}", e);
                ApiError::Rejected(e.to_string())
            }
            StorageError::InvalidTransition { .. }
            | StorageError::BuyerMismatch { .. }
            | StorageError::SellerOversold { .. } => {
                log::warn!("Conflict: {}", e);
                ApiError::Conflict(e.to_string())
            }
            StorageError::Backend(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Hash(detail) => ApiError::Internal(detail),
            AuthError::Token(_) | AuthError::Subject => {
                ApiError::Unauthorized("Invalid or expired token".into())
            }
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("blocking task failed: {e}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Money, Percentage};

    #[test]
    fn storage_errors_map_to_statuses() {
        let cases = [
            (StorageError::not_found("Property", 9), StatusCode::NOT_FOUND),
            (StorageError::DuplicateEmail, StatusCode::CONFLICT),
            (
                StorageError::InsufficientTokens {
                    requested: Percentage::from_whole(12),
                    available: Percentage::from_whole(10),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                StorageError::InvalidTransition {
                    from: "completed",
                    to: "cancelled",
                },
                StatusCode::CONFLICT,
            ),
            (
                StorageError::BalanceOverflow {
                    balance: Money::from_hundredths(i64::MAX),
                    amount: Money::from_whole(1),
                },
                StatusCode::BAD_REQUEST,
            ),
            (StorageError::Backend("pool timed out".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (storage, status) in cases {
            assert_eq!(ApiError::from(storage).status(), status);
        }
    }

    #[test]
    fn not_found_message_names_the_entity() {
        let err = ApiError::from(StorageError::not_found("Property", 9));
        assert_eq!(err.to_string(), "Property not found");
    }
}
