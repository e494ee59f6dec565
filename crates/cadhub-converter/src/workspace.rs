//! Job-scoped scratch directories.
//!
//! A [`Workspace`] is created under the shared temp root when a job starts
//! executing and removed when it is released. Dropping an unreleased
//! workspace removes it synchronously, so panics and early returns never
//! leak a directory. [`sweep_stale`] removes directories left behind by a
//! crashed process.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ConversionFailure;

/// Name prefix of every workspace directory; the sweep ignores anything else.
pub const WORKSPACE_PREFIX: &str = "job-";

/// Exclusive scratch directory for one execution attempt.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    /// Create a uniquely named directory under `parent`.
    ///
    /// `parent` must already exist; it is created once at startup.
    pub async fn acquire(parent: &Path) -> Result<Self, ConversionFailure> {
        let name = format!("{WORKSPACE_PREFIX}{}", Uuid::now_v7().simple());
        let path = parent.join(name);

        tokio::fs::create_dir(&path).await.map_err(|e| {
            ConversionFailure::unknown(format!(
                "Failed to create workspace '{}': {e}",
                path.display()
            ))
        })?;

        debug!(workspace = %path.display(), "Workspace acquired");
        Ok(Self {
            path,
            released: false,
        })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the workspace.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the directory and everything in it.
    pub async fn release(mut self) -> io::Result<()> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                debug!(workspace = %self.path.display(), "Workspace released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(workspace = %self.path.display(), error = %e, "Failed to release workspace");
                Err(e)
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(workspace = %self.path.display(), error = %e, "Failed to remove dropped workspace");
            }
        } else {
            debug!(workspace = %self.path.display(), "Workspace removed on drop");
        }
    }
}

/// Remove workspace directories under `parent` last modified more than
/// `max_age` ago. Returns how many were removed.
pub async fn sweep_stale(parent: &Path, max_age: Duration) -> io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(parent).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(WORKSPACE_PREFIX) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(m) if m.is_dir() => m,
            _ => continue,
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        match tokio::fs::remove_dir_all(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => {
                warn!(workspace = %entry.path().display(), error = %e, "Failed to sweep stale workspace");
            }
        }
    }

    if removed > 0 {
        info!(removed, root = %parent.display(), "Swept stale workspaces");
    }
    Ok(removed)
}
