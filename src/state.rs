use std::sync::Arc;

use crate::config::Config;
use crate::scoring::SentenceScorer;
use axum::extract::FromRef;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub scorer: Arc<dyn SentenceScorer>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<dyn SentenceScorer> {
    fn from_ref(state: &AppState) -> Self {
        state.scorer.clone()
    }
}
