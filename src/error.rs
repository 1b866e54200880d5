use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    // Session errors
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Authentication failed. Please try again.")]
    AuthenticationFailed,

    // OTP errors
    #[error("Enter a valid mobile number or email address.")]
    InvalidContact,
    #[error("Please request a new OTP for this contact.")]
    NoPendingOtp,
    #[error("OTP has expired. Please request a new code.")]
    OtpExpired,
    #[error("Too many incorrect attempts. Please request a new OTP.")]
    TooManyAttempts,
    #[error("Enter the {0}-digit OTP sent to you.")]
    MalformedOtp(usize),
    #[error("Incorrect OTP. Please try again.")]
    InvalidOtp,

    // Document errors
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    #[error("Document store unavailable")]
    StoreUnavailable,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Bad request: {0}")]
    BadRequest(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Redis errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    // JWT errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            // 400 Bad Request
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidContact => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::NoPendingOtp => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::OtpExpired => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::MalformedOtp(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::InvalidOtp => (StatusCode::BAD_REQUEST, self.to_string()),

            // 401 Unauthorized
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),

            // 404 Not Found
            AppError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),

            // 429 Too Many Requests
            AppError::TooManyAttempts => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),

            // 502 Bad Gateway
            AppError::AuthenticationFailed => (StatusCode::BAD_GATEWAY, self.to_string()),

            // 503 Service Unavailable
            AppError::StoreUnavailable => {
                tracing::error!("Document store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Malformed record".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
