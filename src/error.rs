//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::processor::ProcessorError;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Processor Errors**: Failed or rejected calls to the payment processor
/// - **Authentication Errors**: Invalid or missing operator keys
/// - **Resource Errors**: Requested runs or merchant accounts not found
/// - **Job Errors**: A run is already in progress, or the platform account is not configured
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The payment processor rejected a request or could not be reached.
    #[error("Payment processor error: {0}")]
    Processor(#[from] ProcessorError),

    /// Operator key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Requested collection run does not exist.
    #[error("Collection run not found")]
    RunNotFound,

    /// Requested merchant account does not exist.
    #[error("Merchant account not found")]
    MerchantAccountNotFound,

    /// The merchant account already carries a collection marker.
    #[error("Merchant account {0} was already collected")]
    AlreadyCollected(uuid::Uuid),

    /// Another collection run is still executing in this process.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("A collection run is already in progress")]
    RunInProgress,

    /// No platform-owned merchant account exists for the charge processor,
    /// so collected balances would have nowhere to be attributed.
    #[error("Platform merchant account for {0} is missing")]
    PlatformAccountMissing(String),

    /// The task executing a run panicked or was aborted before finishing.
    #[error("Collection run task did not finish: {0}")]
    RunAborted(#[from] tokio::task::JoinError),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Database and processor errors hide their details from the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::RunNotFound => (StatusCode::NOT_FOUND, "run_not_found", self.to_string()),
            AppError::MerchantAccountNotFound => (
                StatusCode::NOT_FOUND,
                "merchant_account_not_found",
                self.to_string(),
            ),
            AppError::RunInProgress => (StatusCode::CONFLICT, "run_in_progress", self.to_string()),
            AppError::AlreadyCollected(_) => {
                (StatusCode::CONFLICT, "already_collected", self.to_string())
            }
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::PlatformAccountMissing(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "platform_account_missing",
                self.to_string(),
            ),
            AppError::Processor(_) => (
                StatusCode::BAD_GATEWAY,
                "processor_error",
                "The payment processor request failed".to_string(),
            ),
            AppError::Database(_) | AppError::RunAborted(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
