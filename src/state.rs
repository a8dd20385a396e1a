//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{db::DbPool, services::run_service::CollectionRunner};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub runner: Arc<CollectionRunner>,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
