use std::time::Instant;

use crate::database::Db;

/// Shared handles injected into every handler. The store connection is
/// constructed once at startup and passed down explicitly.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: Db) -> Self {
        AppState {
            db,
            started_at: Instant::now(),
        }
    }
}
