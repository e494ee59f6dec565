//! Worker runner: main loop that pulls job ids off the queue and executes them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tracing;

use cadhub_cache::{Delivery, JobQueue};
use cadhub_core::config::WorkerConfig;

use crate::jobs::{ConversionJobHandler, ProcessOutcome};

/// Pause after a queue error before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Main worker runner that polls the queue and executes conversion jobs
#[derive(Debug)]
pub struct WorkerRunner {
    /// Job queue for polling
    queue: Arc<dyn JobQueue>,
    /// Per-job pipeline
    handler: Arc<ConversionJobHandler>,
    /// Worker configuration
    config: WorkerConfig,
    /// Worker identifier
    worker_id: String,
}

impl WorkerRunner {
    /// Create a new worker runner
    pub fn new(
        queue: Arc<dyn JobQueue>,
        handler: Arc<ConversionJobHandler>,
        config: WorkerConfig,
        worker_id: String,
    ) -> Self {
        Self {
            queue,
            handler,
            config,
            worker_id,
        }
    }

    /// Start the worker runner; runs until the cancel signal is received.
    ///
    /// At most `concurrency` jobs run at once. After the signal no new job
    /// is dequeued; a dequeue already waiting is allowed to return and its
    /// job runs with the others in flight, which get
    /// `shutdown_grace_seconds` to finish.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        let concurrency = self.config.concurrency.max(1);
        tracing::info!(
            worker_id = %self.worker_id,
            concurrency,
            "Worker started"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));

        loop {
            if *cancel.borrow() {
                break;
            }

            let permit = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            // Not raced against the signal; a claimed delivery must reach
            // `execute`. Bounded by the queue's dequeue timeout.
            let dequeued = self.queue.dequeue().await;

            match dequeued {
                Ok(Some(delivery)) => {
                    let queue = Arc::clone(&self.queue);
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        let _permit = permit;
                        execute(queue, handler, delivery).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tracing::trace!(worker_id = %self.worker_id, "No jobs available");
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(worker_id = %self.worker_id, error = %e, "Failed to dequeue job");
                    tokio::select! {
                        _ = cancel.changed() => {}
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!(
            worker_id = %self.worker_id,
            "Worker waiting for in-flight jobs to complete..."
        );

        let grace = Duration::from_secs(self.config.shutdown_grace_seconds);
        let drained =
            tokio::time::timeout(grace, semaphore.acquire_many(concurrency as u32)).await;
        if drained.is_err() {
            tracing::warn!(
                worker_id = %self.worker_id,
                grace_seconds = self.config.shutdown_grace_seconds,
                "Shutdown grace period elapsed with jobs still running"
            );
        }

        tracing::info!(worker_id = %self.worker_id, "Worker shut down complete");
    }
}

/// Run one delivery and acknowledge it once its outcome is recorded.
///
/// A store failure leaves the delivery unacknowledged.
async fn execute(queue: Arc<dyn JobQueue>, handler: Arc<ConversionJobHandler>, delivery: Delivery) {
    let job_id = delivery.job_id;
    match handler.process(job_id).await {
        Ok(outcome) => {
            match outcome {
                ProcessOutcome::Finished(state) => {
                    tracing::info!(job_id = %job_id, state = %state, "Job finished");
                }
                ProcessOutcome::Skipped => {
                    tracing::debug!(job_id = %job_id, "Job skipped");
                }
            }
            if let Err(e) = queue.ack(&delivery).await {
                tracing::error!(job_id = %job_id, error = %e, "Failed to acknowledge job");
            }
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Job store failure while processing");
        }
    }
}
