//! In-memory job queue backed by a tokio channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use cadhub_core::error::AppError;
use cadhub_core::result::AppResult;
use cadhub_core::types::id::JobId;

use crate::traits::{Delivery, JobQueue};

/// Single-process FIFO queue.
///
/// Workers share the receiver; whoever holds the lock waits for the next id.
/// Acknowledgement is a no-op since a crashed process loses the queue anyway.
#[derive(Debug, Clone)]
pub struct MemoryJobQueue {
    sender: mpsc::UnboundedSender<JobId>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<JobId>>>,
    pending: Arc<AtomicU64>,
    dequeue_timeout: Duration,
}

impl MemoryJobQueue {
    /// Create a queue whose `dequeue` waits at most `dequeue_timeout`.
    pub fn new(dequeue_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            pending: Arc::new(AtomicU64::new(0)),
            dequeue_timeout,
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, id: JobId) -> AppResult<()> {
        // Counted before the send so a racing dequeue never sees zero.
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(id).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(AppError::broker("Job queue is closed"));
        }
        debug!(job_id = %id, "Job enqueued");
        Ok(())
    }

    async fn dequeue(&self) -> AppResult<Option<Delivery>> {
        let received = tokio::time::timeout(self.dequeue_timeout, async {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        })
        .await;

        match received {
            Ok(Some(id)) => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                Ok(Some(Delivery::new(id)))
            }
            Ok(None) => Err(AppError::broker("Job queue is closed")),
            Err(_) => Ok(None),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> AppResult<()> {
        debug!(job_id = %delivery.job_id, "Job acknowledged");
        Ok(())
    }

    async fn pending(&self) -> AppResult<u64> {
        Ok(self.pending.load(Ordering::Acquire))
    }
}
