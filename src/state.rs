//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: SqlitePool,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            inner: Arc::new(AppStateInner { db }),
        }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }
}
