//! Per-job conversion pipeline.
//!
//! mark RUNNING -> classify -> acquire workspace -> dispatch -> release
//! workspace -> mark SUCCEEDED or FAILED.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use cadhub_cache::JobStore;
use cadhub_converter::{ConversionFailure, Dispatcher, Workspace, classify};
use cadhub_core::error::ErrorKind;
use cadhub_core::result::AppResult;
use cadhub_core::types::id::JobId;
use cadhub_entity::job::{Job, JobState, Transition};
use cadhub_service::StorageLayout;

/// Progress detail posted as soon as a job starts.
pub const STARTING_DETAIL: &str = "Starting conversion...";

/// What happened to a delivered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The job ran and reached this terminal state.
    Finished(JobState),
    /// The job was missing or already claimed; nothing ran.
    Skipped,
}

/// Runs one job through the dispatcher and records every transition.
#[derive(Debug, Clone)]
pub struct ConversionJobHandler {
    /// Job store.
    store: Arc<dyn JobStore>,
    /// Strategy dispatcher.
    dispatcher: Dispatcher,
    /// Upload, output and workspace directories.
    layout: StorageLayout,
}

impl ConversionJobHandler {
    /// Create a new conversion job handler.
    pub fn new(store: Arc<dyn JobStore>, dispatcher: Dispatcher, layout: StorageLayout) -> Self {
        Self {
            store,
            dispatcher,
            layout,
        }
    }

    /// Process a delivered job id.
    ///
    /// `RUNNING` is recorded before any collaborator runs. Redeliveries of
    /// a job that already left `QUEUED` are skipped. An `Err` means the
    /// store itself failed; conversion failures end as `Finished(Failed)`.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn process(&self, job_id: JobId) -> AppResult<ProcessOutcome> {
        let Some(job) = self.store.get(job_id).await? else {
            warn!("Delivered job does not exist, skipping");
            return Ok(ProcessOutcome::Skipped);
        };

        if job.state != JobState::Queued {
            info!(state = %job.state, "Job already claimed, skipping redelivery");
            return Ok(ProcessOutcome::Skipped);
        }

        let job = match self.store.update(job_id, Transition::Start).await {
            Ok(job) => job,
            Err(e) if e.kind == ErrorKind::Conflict => {
                info!(reason = %e.message, "Job claimed concurrently, skipping");
                return Ok(ProcessOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        info!(
            input = %job.input_reference,
            original = %job.original_name,
            "Processing conversion job"
        );
        self.progress(job_id, STARTING_DETAIL).await;

        let transition = match self.convert(&job).await {
            Ok(output) => {
                info!(output = %output.display(), "Conversion job succeeded");
                Transition::Succeed {
                    result_reference: output.to_string_lossy().into_owned(),
                }
            }
            Err(failure) => {
                warn!(kind = %failure.kind, "Conversion job failed");
                Transition::Fail(failure.into())
            }
        };

        let job = self.store.update(job_id, transition).await?;
        Ok(ProcessOutcome::Finished(job.state))
    }

    async fn convert(&self, job: &Job) -> Result<PathBuf, ConversionFailure> {
        let strategy = match classify(&job.input_reference) {
            Ok(strategy) => strategy,
            Err(rejected) => {
                let failure = ConversionFailure::from(rejected);
                self.dispatcher.metrics().record_failure(failure.kind);
                return Err(failure);
            }
        };
        self.progress(job.id, strategy.phase()).await;

        let input = self.layout.input_path(&job.input_reference);
        let output = self.layout.output_path(&job.input_reference);

        let workspace = Workspace::acquire(self.layout.temp_dir()).await?;
        debug!(workspace = %workspace.path().display(), "Workspace acquired");

        let result = self
            .dispatcher
            .execute(strategy, &input, &output, &workspace)
            .await;

        if let Err(e) = workspace.release().await {
            warn!(error = %e, "Failed to release workspace");
        }

        result.map(|()| output)
    }

    /// Progress is advisory; a failed update never fails the job.
    async fn progress(&self, job_id: JobId, detail: &str) {
        if let Err(e) = self
            .store
            .update(job_id, Transition::Progress(detail.to_string()))
            .await
        {
            warn!(error = %e, detail, "Failed to post progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadhub_cache::memory::MemoryJobStore;
    use cadhub_converter::testing::{FakeCadKernel, FakeExternalTool, FakeMeshProcessor};
    use cadhub_entity::job::FailureKind;

    struct Fixture {
        root: tempfile::TempDir,
        store: Arc<MemoryJobStore>,
        handler: ConversionJobHandler,
    }

    async fn fixture(kernel: FakeCadKernel, tool: FakeExternalTool) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::rooted_at(root.path());
        layout.init().await.unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let dispatcher = Dispatcher::new(
            Arc::new(kernel),
            Arc::new(FakeMeshProcessor::default()),
            Arc::new(tool),
        );
        let handler = ConversionJobHandler::new(store.clone(), dispatcher, layout);
        Fixture {
            root,
            store,
            handler,
        }
    }

    async fn queued(f: &Fixture, stored: &str, original: &str) -> JobId {
        std::fs::write(f.root.path().join("uploads").join(stored), b"input").unwrap();
        let job = Job::new(stored, original);
        f.store.create(&job).await.unwrap();
        job.id
    }

    fn workspaces_left(f: &Fixture) -> usize {
        std::fs::read_dir(f.root.path().join("temp")).unwrap().count()
    }

    #[tokio::test]
    async fn test_mesh_job_succeeds_with_glb_result() {
        let f = fixture(FakeCadKernel::default(), FakeExternalTool::succeeding()).await;
        let id = queued(&f, "mesh_1.obj", "mesh.obj").await;

        let outcome = f.handler.process(id).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Finished(JobState::Succeeded));

        let job = f.store.get(id).await.unwrap().unwrap();
        let result = job.result_reference.clone().unwrap();
        assert!(result.ends_with("mesh_1.glb"));
        assert!(std::path::Path::new(&result).is_file());
        assert!(job.error.is_none());
        assert!(job.is_consistent());
        assert_eq!(workspaces_left(&f), 0);
    }

    #[tokio::test]
    async fn test_zero_shape_document_fails_with_no_geometry() {
        let kernel = FakeCadKernel::with_objects(&[("Sketch", false)]);
        let f = fixture(kernel, FakeExternalTool::succeeding()).await;
        let id = queued(&f, "part_1.step", "part.step").await;

        f.handler.process(id).await.unwrap();

        let job = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.unwrap().kind, FailureKind::NoGeometryFound);
        assert!(job.result_reference.is_none());
        assert_eq!(workspaces_left(&f), 0);
    }

    #[tokio::test]
    async fn test_failing_tool_keeps_stderr() {
        let f = fixture(FakeCadKernel::default(), FakeExternalTool::failing(1, "bad input")).await;
        let id = queued(&f, "model_1.fbx", "model.fbx").await;

        f.handler.process(id).await.unwrap();

        let job = f.store.get(id).await.unwrap().unwrap();
        let error = job.error.unwrap();
        assert_eq!(error.kind, FailureKind::ExternalToolFailure);
        assert!(error.message.contains("bad input"));
        assert_eq!(workspaces_left(&f), 0);
    }

    #[tokio::test]
    async fn test_panicking_collaborator_fails_as_unknown() {
        let kernel = FakeCadKernel::with_objects(&[("Body", true)]).panicking_on_export();
        let f = fixture(kernel, FakeExternalTool::succeeding()).await;
        let id = queued(&f, "part_1.iges", "part.iges").await;

        f.handler.process(id).await.unwrap();

        let job = f.store.get(id).await.unwrap().unwrap();
        let error = job.error.unwrap();
        assert_eq!(error.kind, FailureKind::Unknown);
        assert!(error.message.contains("kernel exploded"));
        assert_eq!(workspaces_left(&f), 0);
    }

    #[tokio::test]
    async fn test_unsupported_stored_input_fails_without_workspace() {
        let f = fixture(FakeCadKernel::default(), FakeExternalTool::succeeding()).await;
        let id = queued(&f, "notes_1.txt", "notes.txt").await;

        f.handler.process(id).await.unwrap();

        let job = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(job.error.unwrap().kind, FailureKind::UnsupportedFormat);
        assert_eq!(workspaces_left(&f), 0);
    }

    #[tokio::test]
    async fn test_redelivery_is_skipped() {
        let f = fixture(FakeCadKernel::default(), FakeExternalTool::succeeding()).await;
        let id = queued(&f, "mesh_1.stl", "mesh.stl").await;

        f.handler.process(id).await.unwrap();
        let first = f.store.get(id).await.unwrap().unwrap();

        let outcome = f.handler.process(id).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Skipped);
        assert_eq!(f.store.get(id).await.unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn test_unknown_job_is_skipped() {
        let f = fixture(FakeCadKernel::default(), FakeExternalTool::succeeding()).await;
        let outcome = f.handler.process(JobId::new()).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_running_job_is_not_restarted() {
        let f = fixture(FakeCadKernel::default(), FakeExternalTool::succeeding()).await;
        let id = queued(&f, "mesh_1.obj", "mesh.obj").await;
        f.store.update(id, Transition::Start).await.unwrap();

        let outcome = f.handler.process(id).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Skipped);
        assert_eq!(
            f.store.get(id).await.unwrap().unwrap().state,
            JobState::Running
        );
    }
}
