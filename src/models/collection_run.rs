//! Collection run models.
//!
//! Every execution of the collection job is persisted as a run, with one outcome
//! row per merchant account it examined.
//!
//! # Run Lifecycle
//!
//! 1. Row inserted with status `running`
//! 2. One `collection_outcomes` row written per examined account
//! 3. Row finished as `completed` (with counters) or `failed` (with the error)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What caused a run to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    Scheduled,
    Manual,
    Once,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
            RunTrigger::Once => "once",
        }
    }
}

/// Represents a row of the `collection_runs` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CollectionRun {
    pub id: Uuid,

    /// `scheduled`, `manual` or `once`
    pub trigger: String,

    /// Operator key that started a manual run
    pub triggered_by: Option<Uuid>,

    pub dry_run: bool,

    /// `running`, `completed` or `failed`
    pub status: String,

    pub accounts_examined: i64,
    pub accounts_collected: i64,
    pub accounts_skipped: i64,
    pub accounts_failed: i64,

    /// Sum of all transfers made by this run, in cents
    pub amount_collected_cents: i64,

    /// Why the run failed as a whole (per-account failures live in the outcomes)
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Represents a row of the `collection_outcomes` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CollectionOutcomeRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub merchant_account_id: Uuid,

    /// Outcome code, see `AccountOutcome::code`
    pub outcome: String,

    pub transfer_id: Option<String>,
    pub amount_cents: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/collection-runs`.
///
/// ```json
/// { "dry_run": true }
/// ```
///
/// When `dry_run` is omitted the configured default applies.
#[derive(Debug, Default, Deserialize)]
pub struct StartRunRequest {
    #[serde(default)]
    pub dry_run: Option<bool>,
}

/// Query string for `GET /api/v1/collection-runs`.
#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

fn default_list_limit() -> i64 {
    20
}

/// A run together with the outcomes it recorded.
#[derive(Debug, Serialize)]
pub struct CollectionRunResponse {
    #[serde(flatten)]
    pub run: CollectionRun,
    pub outcomes: Vec<CollectionOutcomeRecord>,
}
