use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use duka_core::CoreError;
use duka_order::{DeliveryError, OrderError};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    PaymentRequired(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::PaymentRequired(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(_) => AppError::ValidationError(err.to_string()),
            OrderError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            OrderError::InvalidTransition { .. } => AppError::ConflictError(err.to_string()),
            OrderError::PaymentNotAccepted(_) => AppError::PaymentRequired(err.to_string()),
            OrderError::Storage(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            DeliveryError::AlreadyDelivered(_) => AppError::ConflictError(err.to_string()),
            DeliveryError::Storage(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            CoreError::AccessDenied(_) => AppError::AuthorizationError(err.to_string()),
            CoreError::ConfigurationError(_) | CoreError::InternalError(_) => {
                AppError::InternalServerError(err.to_string())
            }
        }
    }
}

/// Malformed or mistyped bodies are client errors.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}
