//! Health check endpoint for service monitoring.

use crate::{db::DbPool, error::AppError};
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
///
/// Returns service status, database connectivity and when the last run finished.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status
    pub status: String,

    /// Database connection status
    pub database: String,

    /// Status of the most recent collection run, if any
    pub last_run_status: Option<String>,

    pub last_run_started_at: Option<DateTime<Utc>>,

    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
}

/// Health check handler.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "database": "connected",
///   "last_run_status": "completed",
///   "last_run_started_at": "2026-10-16T03:00:00Z",
///   "timestamp": "2026-10-17T09:00:00Z"
/// }
/// ```
///
/// If the database is unreachable, returns the standard error response.
pub async fn health_check(State(pool): State<DbPool>) -> Result<Json<HealthResponse>, AppError> {
    let last_run = sqlx::query_as::<_, (String, DateTime<Utc>)>(
        "SELECT status, started_at FROM collection_runs ORDER BY started_at DESC LIMIT 1",
    )
    .fetch_optional(&pool)
    .await?;

    let (last_run_status, last_run_started_at) = match last_run {
        Some((status, started_at)) => (Some(status), Some(started_at)),
        None => (None, None),
    };

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        database: "connected".to_string(),
        last_run_status,
        last_run_started_at,
        timestamp: Utc::now(),
    }))
}
