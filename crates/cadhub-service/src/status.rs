//! Job status and result resolution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use cadhub_cache::JobStore;
use cadhub_core::error::AppError;
use cadhub_core::result::AppResult;
use cadhub_core::types::id::JobId;
use cadhub_entity::job::{Job, JobState};

/// MIME type of converted artifacts.
pub const RESULT_CONTENT_TYPE: &str = "model/gltf-binary";

/// Status document returned to polling clients.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    /// Job identifier.
    pub task_id: JobId,
    /// Current lifecycle state.
    pub state: JobState,
    /// State-dependent detail; `null` while queued.
    pub details: Value,
    /// Present only once the job succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl JobStatusView {
    /// Build the view for a job.
    pub fn from_job(job: &Job) -> Self {
        let details = match job.state {
            JobState::Queued => Value::Null,
            JobState::Running => json!({ "status": job.progress_detail }),
            JobState::Succeeded => json!({
                "status": "SUCCESS",
                "result_path": job.result_reference,
            }),
            JobState::Failed => match job.error {
                Some(ref error) => json!({ "kind": error.kind, "message": error.message }),
                None => Value::Null,
            },
        };

        let download_url =
            (job.state == JobState::Succeeded).then(|| format!("/download/{}", job.id));

        Self {
            task_id: job.id,
            state: job.state,
            details,
            download_url,
        }
    }
}

/// A result artifact ready to be streamed.
#[derive(Debug, Clone)]
pub struct DownloadTarget {
    /// Artifact on disk.
    pub path: PathBuf,
    /// Suggested filename for Content-Disposition.
    pub filename: String,
    /// MIME type for Content-Type.
    pub content_type: &'static str,
    /// Artifact size in bytes.
    pub size: u64,
}

/// Read-side of the job store for polling clients.
#[derive(Clone)]
pub struct StatusService {
    store: Arc<dyn JobStore>,
}

impl std::fmt::Debug for StatusService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusService").finish()
    }
}

impl StatusService {
    /// Creates a new status service.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Load a job or fail with `NotFound`.
    pub async fn job(&self, id: JobId) -> AppResult<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Task '{id}' not found")))
    }

    /// Current status of a job.
    pub async fn status(&self, id: JobId) -> AppResult<JobStatusView> {
        let job = self.job(id).await?;
        Ok(JobStatusView::from_job(&job))
    }

    /// Resolve the artifact of a succeeded job.
    pub async fn download(&self, id: JobId) -> AppResult<DownloadTarget> {
        let job = self.job(id).await?;

        let path = match (job.state, job.result_reference) {
            (JobState::Succeeded, Some(reference)) => PathBuf::from(reference),
            _ => return Err(AppError::not_found("Task not complete or failed.")),
        };

        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                warn!(job_id = %id, path = %path.display(), "Converted file missing");
                return Err(AppError::not_found("Converted file not found."));
            }
        };

        Ok(DownloadTarget {
            filename: file_name(&path),
            path,
            content_type: RESULT_CONTENT_TYPE,
            size,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "result.glb".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadhub_cache::memory::MemoryJobStore;
    use cadhub_core::error::ErrorKind;
    use cadhub_entity::job::{FailureKind, JobError, Transition};

    async fn stored_job(store: &MemoryJobStore) -> Job {
        let job = Job::new("part_1.step", "part.step");
        store.create(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn test_queued_status_has_null_details() {
        let store = Arc::new(MemoryJobStore::new());
        let job = stored_job(&store).await;
        let service = StatusService::new(store);

        let view = service.status(job.id).await.unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["state"], "QUEUED");
        assert!(json["details"].is_null());
        assert!(json.get("download_url").is_none());
        assert_eq!(json["task_id"], job.id.to_string());
    }

    #[tokio::test]
    async fn test_running_status_shows_progress() {
        let store = Arc::new(MemoryJobStore::new());
        let job = stored_job(&store).await;
        store.update(job.id, Transition::Start).await.unwrap();
        store
            .update(job.id, Transition::Progress("Converting mesh...".into()))
            .await
            .unwrap();

        let view = StatusService::new(store).status(job.id).await.unwrap();
        assert_eq!(view.state, JobState::Running);
        assert_eq!(view.details["status"], "Converting mesh...");
    }

    #[tokio::test]
    async fn test_failed_status_exposes_error_verbatim() {
        let store = Arc::new(MemoryJobStore::new());
        let job = stored_job(&store).await;
        store.update(job.id, Transition::Start).await.unwrap();
        store
            .update(
                job.id,
                Transition::Fail(JobError::new(FailureKind::NoGeometryFound, "nothing here")),
            )
            .await
            .unwrap();

        let service = StatusService::new(store);
        let view = service.status(job.id).await.unwrap();
        assert_eq!(view.details["kind"], "NoGeometryFound");
        assert_eq!(view.details["message"], "nothing here");
        assert!(view.download_url.is_none());

        let err = service.download(job.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "Task not complete or failed.");
    }

    #[tokio::test]
    async fn test_succeeded_job_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("part_1.glb");
        std::fs::write(&output, b"glTF").unwrap();

        let store = Arc::new(MemoryJobStore::new());
        let job = stored_job(&store).await;
        store.update(job.id, Transition::Start).await.unwrap();
        store
            .update(
                job.id,
                Transition::Succeed {
                    result_reference: output.to_string_lossy().into_owned(),
                },
            )
            .await
            .unwrap();

        let service = StatusService::new(store);
        let view = service.status(job.id).await.unwrap();
        assert_eq!(view.details["status"], "SUCCESS");
        assert_eq!(view.download_url, Some(format!("/download/{}", job.id)));

        let target = service.download(job.id).await.unwrap();
        assert_eq!(target.filename, "part_1.glb");
        assert_eq!(target.content_type, "model/gltf-binary");
        assert_eq!(target.size, 4);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_not_found() {
        let store = Arc::new(MemoryJobStore::new());
        let job = stored_job(&store).await;
        store.update(job.id, Transition::Start).await.unwrap();
        store
            .update(
                job.id,
                Transition::Succeed {
                    result_reference: "/nonexistent/part_1.glb".into(),
                },
            )
            .await
            .unwrap();

        let err = StatusService::new(store).download(job.id).await.unwrap_err();
        assert_eq!(err.message, "Converted file not found.");
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let service = StatusService::new(Arc::new(MemoryJobStore::new()));
        let err = service.status(JobId::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
