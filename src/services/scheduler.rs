//! Periodic trigger for collection runs.

use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::{
    error::AppError, models::collection_run::RunTrigger, services::run_service::CollectionRunner,
};

/// Spawn a task that runs a collection every `period`.
///
/// The first run happens after one full period unless `run_immediately` is set.
/// Ticks missed while a long run was executing are skipped, not queued.
pub fn spawn(
    runner: Arc<CollectionRunner>,
    period: Duration,
    run_immediately: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = if run_immediately {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            period_secs = period.as_secs(),
            run_immediately,
            "Collection scheduler started"
        );

        loop {
            interval.tick().await;

            // Other failures are logged and recorded by the runner; the next tick retries
            if let Err(AppError::RunInProgress) =
                runner.run(RunTrigger::Scheduled, None, None).await
            {
                tracing::warn!("Skipping scheduled collection: a run is already in progress");
            }
        }
    })
}
