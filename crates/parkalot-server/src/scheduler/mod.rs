//! Background job scheduler.
//!
//! Two named tasks run on independent cron cadences: the heartbeat, which
//! only advances `last_updated`, and the refresh, which drives the full
//! locate/infer/count/persist pipeline.

mod guard;
mod heartbeat;
mod refresh;

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

pub use heartbeat::Heartbeat;
pub use refresh::RefreshPipeline;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if a cron expression is invalid, a job
/// cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    refresh: Arc<RefreshPipeline>,
    heartbeat: Arc<Heartbeat>,
    config: &parkalot_core::AppConfig,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_heartbeat_job(&scheduler, heartbeat, &config.heartbeat_cron).await?;
    register_refresh_job(&scheduler, refresh, &config.refresh_cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_heartbeat_job(
    scheduler: &JobScheduler,
    heartbeat: Arc<Heartbeat>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let heartbeat = Arc::clone(&heartbeat);
        Box::pin(async move {
            tracing::debug!("scheduler: heartbeat tick");
            heartbeat.run_guarded().await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: heartbeat job registered");
    Ok(())
}

async fn register_refresh_job(
    scheduler: &JobScheduler,
    refresh: Arc<RefreshPipeline>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let refresh = Arc::clone(&refresh);
        Box::pin(async move {
            tracing::info!("scheduler: starting refresh run");
            if let Some(report) = refresh.run_guarded().await {
                tracing::info!(
                    updated = report.updated.len(),
                    skipped = report.skipped.len(),
                    failed_fetch = report.fetch_error.is_some(),
                    "scheduler: refresh run complete"
                );
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: refresh job registered");
    Ok(())
}
