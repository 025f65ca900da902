use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parkalot_db::{DbError, LocationStore};

use super::guard::CycleGuard;
use crate::bounded::bounded;

/// Advances `last_updated` on every lot without re-running inference.
pub struct Heartbeat {
    store: Arc<dyn LocationStore>,
    store_timeout: Duration,
    guard: CycleGuard,
}

impl Heartbeat {
    pub fn new(store: Arc<dyn LocationStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
            guard: CycleGuard::new("heartbeat"),
        }
    }

    /// Touch every lot once.
    ///
    /// # Errors
    ///
    /// Returns the store error; the scheduled job logs it and carries on.
    pub async fn touch(&self) -> Result<u64, DbError> {
        let touched = bounded(self.store_timeout, self.store.touch_all(Utc::now())).await?;
        tracing::info!(touched, "scheduler: heartbeat touched parking lots");
        Ok(touched)
    }

    /// Scheduled entry point: skips overlapping ticks and never propagates.
    pub async fn run_guarded(&self) {
        let Some(_running) = self.guard.try_enter() else {
            return;
        };
        if let Err(e) = self.touch().await {
            tracing::error!(error = %e, "scheduler: heartbeat failed");
        }
    }
}
