//! Collection runner: one persisted run per execution of the collection job.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::collection_run::RunTrigger,
    processor::ChargeProcessor,
    services::collection_service::{
        self, CollectionSettings, CollectionStore, RunReport, RunTotals,
    },
};

/// Result of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub totals: RunTotals,
    pub report: RunReport,
}

/// Executes collection runs, at most one at a time.
///
/// Both the scheduler and the operator API go through the same runner, so a manual
/// trigger during a scheduled run is refused instead of scanning the same accounts twice.
pub struct CollectionRunner {
    store: Arc<dyn CollectionStore>,
    processor: Arc<dyn ChargeProcessor>,
    settings: CollectionSettings,
    in_progress: Arc<Mutex<()>>,
}

impl CollectionRunner {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        processor: Arc<dyn ChargeProcessor>,
        settings: CollectionSettings,
    ) -> Self {
        Self {
            store,
            processor,
            settings,
            in_progress: Arc::new(Mutex::new(())),
        }
    }

    pub fn settings(&self) -> &CollectionSettings {
        &self.settings
    }

    /// Run one collection pass.
    ///
    /// `dry_run` overrides the configured default when given. The pass executes on its own
    /// task: dropping the returned future stops waiting for the result but never interrupts
    /// the run between a transfer and its ledger update.
    ///
    /// # Errors
    ///
    /// - `RunInProgress`: another run holds the runner
    /// - Any error that aborted the run as a whole (the run row is marked `failed`)
    pub async fn run(
        &self,
        trigger: RunTrigger,
        triggered_by: Option<Uuid>,
        dry_run: Option<bool>,
    ) -> Result<RunSummary, AppError> {
        let guard = self
            .in_progress
            .clone()
            .try_lock_owned()
            .map_err(|_| AppError::RunInProgress)?;

        let store = self.store.clone();
        let processor = self.processor.clone();
        let settings = CollectionSettings {
            dry_run: dry_run.unwrap_or(self.settings.dry_run),
            ..self.settings.clone()
        };

        let task = tokio::spawn(async move {
            let _guard = guard;
            execute(
                store.as_ref(),
                processor.as_ref(),
                &settings,
                trigger,
                triggered_by,
            )
            .await
        });

        task.await?
    }

    /// Wait until no run is executing.
    pub async fn wait_idle(&self) {
        let _idle = self.in_progress.lock().await;
    }
}

async fn execute(
    store: &dyn CollectionStore,
    processor: &dyn ChargeProcessor,
    settings: &CollectionSettings,
    trigger: RunTrigger,
    triggered_by: Option<Uuid>,
) -> Result<RunSummary, AppError> {
    let run_id = store
        .start_run(trigger, triggered_by, settings.dry_run)
        .await?;

    tracing::info!(
        %run_id,
        trigger = trigger.as_str(),
        dry_run = settings.dry_run,
        country = %settings.country,
        inactivity_window_months = settings.inactivity_window_months,
        "Collection run started"
    );

    let result =
        collection_service::collect_unclaimed_balances(store, processor, settings, run_id, Utc::now())
            .await;

    match result {
        Ok(report) => {
            let totals = report.totals();
            store.complete_run(run_id, &totals).await?;

            tracing::info!(
                %run_id,
                examined = totals.accounts_examined,
                collected = totals.accounts_collected,
                skipped = totals.accounts_skipped,
                failed = totals.accounts_failed,
                amount_collected_cents = totals.amount_collected_cents,
                "Collection run completed"
            );

            Ok(RunSummary {
                run_id,
                dry_run: settings.dry_run,
                totals,
                report,
            })
        }
        Err(e) => {
            tracing::error!(%run_id, error = %e, "Collection run failed");
            if let Err(mark_err) = store.fail_run(run_id, &e.to_string()).await {
                tracing::error!(%run_id, error = %mark_err, "Failed to mark run as failed");
            }
            Err(e)
        }
    }
}
