//! Stale workspace sweep.
//!
//! Workspaces are released on every exit path of a job, but a worker
//! killed mid-conversion leaves its directory behind. This job removes
//! those once they are older than the configured age.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use cadhub_converter::workspace::sweep_stale;
use cadhub_core::error::AppError;

/// Removes abandoned job workspaces under the temp root.
#[derive(Debug, Clone)]
pub struct WorkspaceSweepJob {
    /// Workspace parent directory.
    temp_dir: PathBuf,
    /// Minimum age before a workspace counts as abandoned.
    max_age: Duration,
}

impl WorkspaceSweepJob {
    /// Create a new sweep job
    pub fn new(temp_dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            max_age,
        }
    }

    /// Run one sweep, returning how many workspaces were removed.
    pub async fn run(&self) -> Result<usize, AppError> {
        let removed = sweep_stale(&self.temp_dir, self.max_age).await.map_err(|e| {
            warn!(dir = %self.temp_dir.display(), error = %e, "Workspace sweep failed");
            AppError::storage(format!(
                "Failed to sweep '{}': {}",
                self.temp_dir.display(),
                e
            ))
        })?;

        debug!(removed, "Workspace sweep finished");
        Ok(removed)
    }
}
