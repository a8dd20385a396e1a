//! Unclaimed Balance Collector - Main Application Entry Point
//!
//! Moves the balances of long-dormant seller sub-accounts at the payment processor into the
//! platform's own account, and re-attributes the matching unpaid ledger rows.
//!
//! # Architecture
//!
//! - **Job**: sequential scan over candidate merchant accounts (`services::collection_service`)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Processor**: Stripe REST API via reqwest (`processor::stripe`)
//! - **Operator API**: Axum, authenticated with hashed operator keys
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Either run one collection and exit (`COLLECTOR_MODE=once`), or
//!    start the scheduler and serve the operator API

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod processor;
mod services;
mod state;

use std::{sync::Arc, time::Duration};

use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    config::CollectorMode,
    models::collection_run::RunTrigger,
    processor::stripe::StripeClient,
    services::{collection_store::PgCollectionStore, run_service::CollectionRunner, scheduler},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let processor = StripeClient::new(
        &config.stripe_api_base,
        config.stripe_secret_key.clone(),
        Duration::from_secs(config.stripe_timeout_secs),
    )?;
    let runner = Arc::new(CollectionRunner::new(
        Arc::new(PgCollectionStore::new(pool.clone())),
        Arc::new(processor),
        config.collection_settings(),
    ));

    if config.collector_mode == CollectorMode::Once {
        let summary = runner.run(RunTrigger::Once, None, None).await?;
        tracing::info!(
            run_id = %summary.run_id,
            collected = summary.totals.accounts_collected,
            failed = summary.totals.accounts_failed,
            "Single collection run finished"
        );
        return Ok(());
    }

    let scheduler_task = scheduler::spawn(
        runner.clone(),
        Duration::from_secs(config.job_interval_secs.max(1)),
        config.run_on_startup,
    );

    let app = router(AppState {
        pool,
        runner: runner.clone(),
    });

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // No new scheduled runs; a run already started is allowed to finish
    scheduler_task.abort();
    runner.wait_idle().await;
    tracing::info!("No collection run in progress, exiting");

    Ok(())
}

/// Build the operator API.
fn router(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        .route(
            "/api/v1/collection-runs",
            post(handlers::runs::create_run).get(handlers::runs::list_runs),
        )
        .route("/api/v1/collection-runs/{id}", get(handlers::runs::get_run))
        .route(
            "/api/v1/merchant-accounts/{id}/collection",
            get(handlers::merchant_accounts::get_collection_status),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.pool.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
