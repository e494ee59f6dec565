//! Job store and job queue traits.
//!
//! The store is the single source of truth for job state; the queue only
//! carries job ids. Both are shared by the submission gateway and every
//! worker, so implementations must be `Send + Sync`.

use async_trait::async_trait;

use cadhub_core::result::AppResult;
use cadhub_core::types::id::JobId;
use cadhub_entity::job::{Job, Transition};

/// Persistent mapping from job id to job record.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a new job. Fails with a conflict if the id already exists.
    async fn create(&self, job: &Job) -> AppResult<()>;

    /// Look up a job by id.
    async fn get(&self, id: JobId) -> AppResult<Option<Job>>;

    /// Apply a transition atomically and return the updated job.
    ///
    /// Illegal transitions fail with `ErrorKind::Conflict` and leave the
    /// stored record untouched; unknown ids fail with `ErrorKind::NotFound`.
    async fn update(&self, id: JobId, transition: Transition) -> AppResult<Job>;

    /// Remove a job record. Returns whether it existed.
    async fn delete(&self, id: JobId) -> AppResult<bool>;

    /// Drop finished jobs older than the retention period.
    ///
    /// Backends that expire records on their own return `Ok(0)`.
    async fn purge_expired(&self) -> AppResult<usize> {
        Ok(0)
    }

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

/// A dequeued job id together with the handle needed to acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The job to process.
    pub job_id: JobId,
    /// Backend-specific receipt used by [`JobQueue::ack`].
    pub receipt: String,
}

impl Delivery {
    /// Create a delivery whose receipt is the job id itself.
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            receipt: job_id.to_string(),
        }
    }
}

/// Work queue with at-least-once delivery.
#[async_trait]
pub trait JobQueue: Send + Sync + std::fmt::Debug + 'static {
    /// Make a job available to workers.
    async fn enqueue(&self, id: JobId) -> AppResult<()>;

    /// Wait up to the configured timeout for the next job.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn dequeue(&self) -> AppResult<Option<Delivery>>;

    /// Acknowledge that a delivery has been fully handled.
    async fn ack(&self, delivery: &Delivery) -> AppResult<()>;

    /// Number of jobs waiting to be dequeued.
    async fn pending(&self) -> AppResult<u64>;
}
