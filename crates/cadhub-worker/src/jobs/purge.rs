//! Expired job record purge.

use std::sync::Arc;

use tracing::debug;

use cadhub_cache::JobStore;
use cadhub_core::error::AppError;

/// Drops finished job records past their retention from the store.
#[derive(Debug, Clone)]
pub struct ExpiredJobPurge {
    store: Arc<dyn JobStore>,
}

impl ExpiredJobPurge {
    /// Create a purge over `store`
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Run one purge, returning how many records were removed.
    pub async fn run(&self) -> Result<usize, AppError> {
        let removed = self.store.purge_expired().await?;
        debug!(removed, "Job purge finished");
        Ok(removed)
    }
}
