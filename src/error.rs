use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Query-API error types. Ingestion-side failures never surface here;
/// the worst a caller sees is a stale or incomplete aggregate.
#[derive(Debug)]
pub enum AppError {
    /// Configuration error
    Config(String),
    /// Store read failed
    Store(sqlx::Error),
    /// Result could not be serialized
    Serialization(serde_json::Error),
    /// Internal server error
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Store(err) => write!(f, "Store error: {}", err),
            Self::Serialization(err) => write!(f, "Serialization error: {}", err),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Store(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            Self::Serialization(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::Config(_) => "config_error",
        AppError::Store(_) => "store_error",
        AppError::Serialization(_) => "serialization_error",
        AppError::Internal(_) => "internal_error",
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
