use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::session::InvalidReason;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A connection pool could not be built.
    #[error("Database pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A column was missing or had an unexpected type.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// No session credential was presented.
    #[error("No session provided")]
    NoSession,

    /// The presented session is not (or no longer) valid.
    #[error("Invalid session: {0}")]
    InvalidSession(InvalidReason),

    /// The session store failed or timed out.
    #[error("Session store unavailable: {0}")]
    SessionStore(String),

    /// The request did not arrive over an encrypted transport.
    #[error("Insecure transport")]
    InsecureTransport,

    /// The cache backend failed or timed out.
    #[error("Cache error: {0}")]
    Cache(String),

    /// A payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NoSession => "NO_SESSION",
            AppError::InvalidSession(_) => "INVALID_SESSION",
            AppError::SessionStore(_) => "SESSION_ERROR",
            AppError::InsecureTransport => "INSECURE_TRANSPORT",
            AppError::Authentication(_) => "AUTHENTICATION_FAILED",
            AppError::NotFound => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::RateLimitExceeded(_) => "RATE_LIMITED",
            AppError::Cache(_) => "CACHE_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NoSession | AppError::InvalidSession(_) | AppError::Authentication(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::InsecureTransport => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }

            AppError::Pool(ref e) => {
                tracing::error!("Database pool error: {}", e);
                "Database error".to_string()
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Database pool creation error: {}", e);
                "Database error".to_string()
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                "Cache error".to_string()
            }

            AppError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                "File system error".to_string()
            }

            AppError::MissingData(ref column) => {
                tracing::error!("Missing data for column: {}", column);
                "Internal server error".to_string()
            }

            AppError::NoSession => {
                tracing::debug!("No session presented");
                "Authentication required".to_string()
            }

            AppError::InvalidSession(reason) => {
                tracing::debug!("Session rejected: {}", reason);
                "Session is invalid or expired".to_string()
            }

            AppError::SessionStore(ref msg) => {
                tracing::error!("Session store error: {}", msg);
                "Session service unavailable".to_string()
            }

            AppError::InsecureTransport => {
                tracing::warn!("Rejected request over insecure transport");
                "Encrypted transport required".to_string()
            }

            AppError::Cache(ref msg) => {
                tracing::error!("Cache error: {}", msg);
                "Cache error".to_string()
            }

            AppError::Serialization(ref msg) => {
                tracing::error!("Serialization error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                msg.clone()
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                "Resource not found".to_string()
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                msg.clone()
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                msg.clone()
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": self.code(),
            "message": message
        }))
        .unwrap_or_else(|_| r#"{"error":"INTERNAL_ERROR"}"#.to_string());

        (
            self.status(),
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
