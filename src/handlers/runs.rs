//! Collection run HTTP handlers.
//!
//! This module implements the run-related API endpoints:
//! - POST /api/v1/collection-runs - Run a collection now
//! - GET /api/v1/collection-runs - List recent runs
//! - GET /api/v1/collection-runs/{id} - Get a run with its outcomes

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::collection_run::{
        CollectionOutcomeRecord, CollectionRun, CollectionRunResponse, ListRunsQuery, RunTrigger,
        StartRunRequest,
    },
    state::AppState,
};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

const MAX_LIST_LIMIT: i64 = 100;

/// Run a collection pass immediately.
///
/// # Request Body
///
/// ```json
/// { "dry_run": true }
/// ```
///
/// The body is optional; without it the configured dry-run default applies.
///
/// # Response
///
/// - **201 Created**: the finished run with one outcome per examined account
/// - **409 Conflict**: a run is already in progress
///
/// The request blocks until the run finishes. A client that disconnects early does not
/// stop the run; its result is still recorded and can be fetched from the run list.
pub async fn create_run(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<CollectionRunResponse>), AppError> {
    let request = parse_start_request(&body)?;

    tracing::info!(
        operator = %auth.operator_name,
        dry_run = request.dry_run.unwrap_or(state.runner.settings().dry_run),
        "Manual collection run requested"
    );

    let summary = state
        .runner
        .run(RunTrigger::Manual, Some(auth.operator_key_id), request.dry_run)
        .await?;

    let response = fetch_run(&state.pool, summary.run_id).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// List recent runs, newest first.
///
/// # Query Parameters
///
/// - `limit` - between 1 and 100, defaults to 20
pub async fn list_runs(
    State(pool): State<DbPool>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<CollectionRun>>, AppError> {
    if !(1..=MAX_LIST_LIMIT).contains(&query.limit) {
        return Err(AppError::InvalidRequest(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}"
        )));
    }

    let runs = sqlx::query_as::<_, CollectionRun>(
        "SELECT * FROM collection_runs ORDER BY started_at DESC LIMIT $1",
    )
    .bind(query.limit)
    .fetch_all(&pool)
    .await?;

    Ok(Json(runs))
}

/// Get a run and every outcome it recorded.
///
/// Returns 404 if the run does not exist.
pub async fn get_run(
    State(pool): State<DbPool>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<CollectionRunResponse>, AppError> {
    Ok(Json(fetch_run(&pool, run_id).await?))
}

/// An empty body means "use the defaults".
fn parse_start_request(body: &[u8]) -> Result<StartRunRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StartRunRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::InvalidRequest(format!("Invalid JSON: {e}")))
}

async fn fetch_run(pool: &DbPool, run_id: Uuid) -> Result<CollectionRunResponse, AppError> {
    let run = sqlx::query_as::<_, CollectionRun>("SELECT * FROM collection_runs WHERE id = $1")
        .bind(run_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::RunNotFound)?;

    let outcomes = sqlx::query_as::<_, CollectionOutcomeRecord>(
        "SELECT * FROM collection_outcomes WHERE run_id = $1 ORDER BY created_at, id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(CollectionRunResponse { run, outcomes })
}
