//! In-memory job store using dashmap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use cadhub_core::error::AppError;
use cadhub_core::result::AppResult;
use cadhub_core::types::id::JobId;
use cadhub_entity::job::{Job, Transition};

use crate::traits::JobStore;

/// Default time a finished job is kept.
const DEFAULT_RETENTION: Duration = Duration::from_secs(86_400);

/// In-memory job store.
///
/// Transitions run while the shard lock for the job is held, so two
/// concurrent updates of the same job are serialized. Finished jobs are
/// dropped by [`JobStore::purge_expired`] once `retention` has passed.
#[derive(Debug, Clone)]
pub struct MemoryJobStore {
    jobs: Arc<DashMap<JobId, Job>>,
    retention: Duration,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl MemoryJobStore {
    /// Create an empty store with the default retention.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store keeping finished jobs for `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            retention,
        }
    }

    /// Number of stored jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store holds no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> AppResult<()> {
        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => Err(AppError::conflict(format!(
                "Job {} already exists",
                job.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: JobId) -> AppResult<Option<Job>> {
        Ok(self.jobs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update(&self, id: JobId, transition: Transition) -> AppResult<Job> {
        let mut entry = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;

        let name = transition.name();
        entry.apply(transition)?;
        debug!(job_id = %id, transition = name, state = %entry.state, "Job updated");
        Ok(entry.clone())
    }

    async fn delete(&self, id: JobId) -> AppResult<bool> {
        Ok(self.jobs.remove(&id).is_some())
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        let retention = chrono::Duration::from_std(self.retention)
            .map_err(|e| AppError::internal(format!("Invalid retention: {e}")))?;
        let now = Utc::now();

        let mut removed = 0;
        self.jobs.retain(|_, job| {
            let expired = job.is_expired(retention, now);
            removed += expired as usize;
            !expired
        });

        if removed > 0 {
            info!(removed, "Purged expired jobs");
        }
        Ok(removed)
    }
}
