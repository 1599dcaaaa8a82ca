//! Error types for Coursegate
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.
//!
//! Authentication and authorization failures are answered with the
//! fixed plain-text bodies the browser client expects. Everything else
//! gets a JSON `{"error": ...}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Body sent for every rejected login, whichever half of the pair was wrong.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";

/// Body sent when a gate refuses the request.
pub const NOT_AUTHORISED_MESSAGE: &str = "Not authorised";

/// Body sent when a login or registration omits a field.
pub const MISSING_CREDENTIALS_MESSAGE: &str = "Missing credentials";

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad email/password pair (404, intentionally not 401)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No authenticated identity, or the identity lacks the required role (403)
    #[error("Not authorised")]
    NotAuthorised,

    /// Login or registration body without email or password (400)
    #[error("Missing credentials")]
    MissingCredentials,

    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistence layer failure (500)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Content API answered with a non-success status; relayed as-is
    #[error("Upstream responded with {status}")]
    Upstream { status: StatusCode, body: String },

    /// HTTP client error talking to the content API (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Password hashing failure (500)
    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    /// Session cookie signing failure (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::PasswordHash(err.to_string())
    }
}

impl AppError {
    /// Short label used for the `error_type` metric dimension
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::NotAuthorised => "not_authorised",
            AppError::MissingCredentials => "missing_credentials",
            AppError::NotFound => "not_found",
            AppError::Validation(_) => "validation",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Upstream { .. } => "upstream",
            AppError::HttpClient(_) => "http_client",
            AppError::PasswordHash(_) => "password_hash",
            AppError::Encryption(_) => "encryption",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code and body.
    fn into_response(self) -> Response {
        use axum::Json;

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.kind()])
            .inc();

        let (status, error_message) = match self {
            AppError::InvalidCredentials => {
                return (StatusCode::NOT_FOUND, INVALID_CREDENTIALS_MESSAGE).into_response();
            }
            AppError::NotAuthorised => {
                return (StatusCode::FORBIDDEN, NOT_AUTHORISED_MESSAGE).into_response();
            }
            AppError::MissingCredentials => {
                return (StatusCode::BAD_REQUEST, MISSING_CREDENTIALS_MESSAGE).into_response();
            }
            AppError::Upstream { status, body } => return (status, body).into_response(),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::StoreUnavailable(error) => {
                tracing::error!(%error, "Store unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Store unavailable".to_string(),
                )
            }
            error @ AppError::HttpClient(_) => {
                tracing::warn!(%error, "Content API request failed");
                (StatusCode::BAD_GATEWAY, error.to_string())
            }
            AppError::PasswordHash(msg) | AppError::Encryption(msg) | AppError::Config(msg) => {
                tracing::error!(error = %msg, "Internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(error) => {
                tracing::error!(error = %error, "Internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
