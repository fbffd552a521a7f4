// src/state.rs

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::session::TestSession;

/// Live test-taking sessions keyed by (test_id, student_id).
///
/// Owned by `AppState` rather than a module-level global so all mutable
/// state flows through the request context. The ledger's uniqueness
/// constraint, not this map, is what prevents double submissions across
/// devices.
pub type SessionStore = Arc<Mutex<HashMap<(i64, i64), TestSession>>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        AppState {
            pool,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
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

impl FromRef<AppState> for SessionStore {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
