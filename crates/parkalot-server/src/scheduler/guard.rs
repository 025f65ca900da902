use tokio::sync::{Mutex, MutexGuard};

/// Keeps cycles of one task from overlapping.
///
/// A tick that finds the previous cycle still running is skipped rather
/// than queued.
#[derive(Debug)]
pub struct CycleGuard {
    task: &'static str,
    running: Mutex<()>,
}

impl CycleGuard {
    pub fn new(task: &'static str) -> Self {
        Self {
            task,
            running: Mutex::new(()),
        }
    }

    /// Held for the length of a cycle; `None` if one is already running.
    pub fn try_enter(&self) -> Option<MutexGuard<'_, ()>> {
        let entered = self.running.try_lock().ok();
        if entered.is_none() {
            tracing::warn!(
                task = self.task,
                "scheduler: previous cycle still running; skipping tick"
            );
        }
        entered
    }
}
