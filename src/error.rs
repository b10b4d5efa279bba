//! Application error types and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error (environment, startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No active EspoCRM configuration exists. Raised on strict call paths
    /// (CLI / direct API calls); best-effort async paths skip silently instead.
    #[error("No active EspoCRM configuration found")]
    ConfigurationMissing,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Remote CRM rejected our credentials or returned a malformed token response
    #[error("EspoCRM authentication failed: {0}")]
    Authentication(String),

    /// Transport failure or non-2xx from the remote CRM API
    #[error("EspoCRM request failed: {method} {endpoint}: {message}")]
    RemoteRequest {
        method: String,
        endpoint: String,
        message: String,
    },

    /// Validation error (malformed webhook payload, missing sync parameters)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Webhook signature mismatch; processing fails closed
    #[error("Webhook signature verification failed")]
    SignatureVerification,

    /// Not found error
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Conflict error (e.g., a second active configuration)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Address parse error
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Config(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", msg.clone())
            }
            AppError::ConfigurationMissing => (
                StatusCode::NOT_FOUND,
                "CONFIG_MISSING",
                self.to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database operation failed".to_string(),
            ),
            AppError::Migration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "MIGRATION_ERROR",
                "Database migration failed".to_string(),
            ),
            // Upstream credential rejection, not a caller auth failure
            AppError::Authentication(msg) => (StatusCode::BAD_GATEWAY, "CRM_AUTH_ERROR", msg.clone()),
            AppError::RemoteRequest { .. } => (
                StatusCode::BAD_GATEWAY,
                "CRM_REQUEST_ERROR",
                self.to_string(),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::SignatureVerification => (
                StatusCode::BAD_REQUEST,
                "SIGNATURE_ERROR",
                self.to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                "IO operation failed".to_string(),
            ),
            AppError::AddrParse(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ADDR_PARSE_ERROR",
                "Invalid address".to_string(),
            ),
            AppError::Json(_) => (
                StatusCode::BAD_REQUEST,
                "JSON_ERROR",
                "Invalid JSON".to_string(),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        // Log the error
        tracing::error!(error = %self, code = code, "Request error");

        let body = Json(json!({
            "code": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}
