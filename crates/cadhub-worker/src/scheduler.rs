//! Cron scheduler for periodic maintenance tasks.

use tokio_cron_scheduler::{Job as CronJob, JobScheduler, JobSchedulerError};
use tracing;

use cadhub_core::error::AppError;

use crate::jobs::{ExpiredJobPurge, WorkspaceSweepJob};

/// Cron-based scheduler for periodic background tasks
pub struct CronScheduler {
    /// The underlying job scheduler
    scheduler: JobScheduler,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler
    pub async fn new() -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler })
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }

    /// Stale workspace sweep on `schedule` (six-field cron, seconds first)
    pub async fn register_workspace_sweep(
        &self,
        schedule: &str,
        sweep: WorkspaceSweepJob,
    ) -> Result<(), AppError> {
        let job = CronJob::new_async(schedule, move |_uuid, _lock| {
            let sweep = sweep.clone();
            Box::pin(async move {
                tracing::debug!("Running scheduled workspace sweep");
                if let Err(e) = sweep.run().await {
                    tracing::error!("Scheduled workspace sweep failed: {}", e);
                }
            })
        });
        self.add("workspace_sweep", schedule, job).await
    }

    /// Expired job record purge on `schedule`
    pub async fn register_job_purge(
        &self,
        schedule: &str,
        purge: ExpiredJobPurge,
    ) -> Result<(), AppError> {
        let job = CronJob::new_async(schedule, move |_uuid, _lock| {
            let purge = purge.clone();
            Box::pin(async move {
                tracing::debug!("Running scheduled job purge");
                if let Err(e) = purge.run().await {
                    tracing::error!("Scheduled job purge failed: {}", e);
                }
            })
        });
        self.add("job_purge", schedule, job).await
    }

    async fn add(
        &self,
        name: &str,
        schedule: &str,
        job: Result<CronJob, JobSchedulerError>,
    ) -> Result<(), AppError> {
        let job = job.map_err(|e| {
            AppError::configuration(format!("Invalid {} schedule '{}': {}", name, schedule, e))
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::internal(format!("Failed to add {} schedule: {}", name, e))
        })?;

        tracing::info!("Registered: {} ({})", name, schedule);
        Ok(())
    }
}
