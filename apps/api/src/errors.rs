use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Every error renders as `{ "error": <message>, "code": <CODE>, "details": ... }`.
/// Server-side failures are logged here and answered with a generic message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Plan limit reached: {0}")]
    PlanLimit(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Integration error: {0}")]
    Integration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String, Option<Value>) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
                None,
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), None),
            AppError::PlanLimit(msg) => (
                StatusCode::FORBIDDEN,
                "PLAN_LIMIT_REACHED",
                msg.clone(),
                Some(json!({ "upgradeUrl": "/pricing" })),
            ),
            AppError::NotConfigured(feature) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NOT_CONFIGURED",
                format!("{feature} is not configured"),
                None,
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    None,
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                    Some(Value::String(msg.clone())),
                )
            }
            AppError::Integration(msg) => {
                tracing::error!("Integration error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTEGRATION_ERROR",
                    "An external service error occurred".to_string(),
                    Some(Value::String(msg.clone())),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                    None,
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = self.parts();

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Validation("x".into()).parts().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Unauthorized.parts().0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Forbidden("x".into()).parts().0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotFound("x".into()).parts().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).parts().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_errors_hide_cause() {
        let (_, code, message, details) = AppError::Internal(anyhow::anyhow!("secret")).parts();
        assert_eq!(code, "INTERNAL_ERROR");
        assert!(!message.contains("secret"));
        assert!(details.is_none());
    }

    #[test]
    fn test_plan_limit_carries_upgrade_details() {
        let (status, code, _, details) = AppError::PlanLimit("interviews".into()).parts();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(code, "PLAN_LIMIT_REACHED");
        assert_eq!(details.unwrap()["upgradeUrl"], "/pricing");
    }
}
