//! Unified error handling for the campaign dialer
//!
//! Two error types live here:
//!
//! - [`ProviderError`] is what a telephony provider client returns. Every
//!   failure is classified, and the job processor's retry policy reads the
//!   classification and nothing else.
//! - [`AppError`] is the application-wide error with automatic HTTP response
//!   mapping for the API layer.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// How a failure should be treated by the retry machinery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network, timeout, rate limit: try again after a backoff
    Retryable,
    /// The request itself is wrong: retrying yields the same answer
    Permanent,
    /// Credentials are wrong: never retried, escalated to the operator
    Fatal,
}

/// Classified telephony provider failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Unsafe destination {0}: outside the allow-listed prefixes")]
    UnsafeDestination(String),

    #[error("Provider authentication failed: {0}")]
    Authentication(String),

    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Provider rejected request: {0}")]
    Permanent(String),
}

impl ProviderError {
    /// Classification used by the retry policy
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Transient(_) => ErrorClass::Retryable,
            ProviderError::Authentication(_) => ErrorClass::Fatal,
            ProviderError::InvalidDestination(_)
            | ProviderError::UnsafeDestination(_)
            | ProviderError::Permanent(_) => ErrorClass::Permanent,
        }
    }

    /// Only transient failures are retried
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    // ==================== Provider Errors ====================
    #[error("Unsafe destination {0}: outside the allow-listed prefixes")]
    UnsafeDestination(String),

    #[error("Provider authentication failed: {0}")]
    Authentication(String),

    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Provider rejected request: {0}")]
    Permanent(String),

    // ==================== Budget Errors ====================
    #[error(
        "Call budget exceeded: estimated cost {estimated}, daily remaining {daily_remaining}, monthly remaining {monthly_remaining}"
    )]
    BudgetExceeded {
        estimated: String,
        daily_remaining: String,
        monthly_remaining: String,
    },

    // ==================== Resource Errors ====================
    #[error("Unknown provider call id: {0}")]
    UnknownRecord(String),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Contact not found: {0}")]
    ContactNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Internal Errors ====================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::InvalidDestination(_) => StatusCode::BAD_REQUEST,

            // 402 Payment Required
            AppError::BudgetExceeded { .. } => StatusCode::PAYMENT_REQUIRED,

            // 403 Forbidden
            AppError::UnsafeDestination(_) => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::CallNotFound(_) | AppError::ContactNotFound(_) | AppError::UnknownRecord(_) => {
                StatusCode::NOT_FOUND
            }

            // 409 Conflict
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,

            // 502 Bad Gateway
            AppError::Authentication(_) | AppError::Permanent(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::InvalidDestination(_) => "invalid_destination",
            AppError::UnsafeDestination(_) => "unsafe_destination",
            AppError::Authentication(_) => "provider_authentication_error",
            AppError::Transient(_) => "provider_transient_error",
            AppError::Permanent(_) => "provider_permanent_error",
            AppError::BudgetExceeded { .. } => "budget_exceeded",
            AppError::UnknownRecord(_) => "unknown_record",
            AppError::CallNotFound(_) => "call_not_found",
            AppError::ContactNotFound(_) => "contact_not_found",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidDestination(d) => AppError::InvalidDestination(d),
            ProviderError::UnsafeDestination(d) => AppError::UnsafeDestination(d),
            ProviderError::Authentication(m) => AppError::Authentication(m),
            ProviderError::Transient(m) => AppError::Transient(m),
            ProviderError::Permanent(m) => AppError::Permanent(m),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
