//! Conversion strategy dispatcher.
//!
//! Runs exactly one strategy for one input and returns either `Ok(())`
//! with the output written, or a [`ConversionFailure`]. Panics raised by a
//! collaborator are caught here and reported as `Unknown`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{error, info, instrument, warn};

use cadhub_core::config::ConversionConfig;

use crate::collaborator::{
    CadKernel, CommandLineTool, ExternalTool, MeshProcessor, OpenDocument, ScriptedCadKernel,
    TrimeshProcessor,
};
use crate::error::ConversionFailure;
use crate::executor::ToolError;
use crate::formats::Strategy;
use crate::metrics::ConversionMetrics;
use crate::workspace::Workspace;

/// Intermediate exchange file written by the CAD kernel inside the workspace.
pub const INTERMEDIATE_FILE: &str = "intermediate.step";

/// Routes a strategy to its collaborators.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    cad_kernel: Arc<dyn CadKernel>,
    mesh: Arc<dyn MeshProcessor>,
    external_tool: Arc<dyn ExternalTool>,
    metrics: Arc<ConversionMetrics>,
}

impl Dispatcher {
    /// Create a dispatcher over explicit collaborators.
    pub fn new(
        cad_kernel: Arc<dyn CadKernel>,
        mesh: Arc<dyn MeshProcessor>,
        external_tool: Arc<dyn ExternalTool>,
    ) -> Self {
        Self {
            cad_kernel,
            mesh,
            external_tool,
            metrics: Arc::new(ConversionMetrics::new()),
        }
    }

    /// Create a dispatcher backed by the configured command-line programs.
    pub fn from_config(config: &ConversionConfig) -> Self {
        let collaborator_timeout = Some(Duration::from_secs(config.collaborator_timeout_seconds));
        Self::new(
            Arc::new(ScriptedCadKernel::new(
                &config.cad_kernel_command,
                collaborator_timeout,
            )),
            Arc::new(TrimeshProcessor::new(
                &config.mesh_command,
                collaborator_timeout,
            )),
            Arc::new(CommandLineTool::new(
                &config.external_tool_path,
                Duration::from_secs(config.external_tool_timeout_seconds),
            )),
        )
    }

    /// Share a metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<ConversionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Metrics collector.
    pub fn metrics(&self) -> &Arc<ConversionMetrics> {
        &self.metrics
    }

    /// Convert `input` to `output` using `strategy`.
    ///
    /// Scratch files go into `workspace`; the caller owns its release.
    #[instrument(skip_all, fields(strategy = %strategy, input = %input.display()))]
    pub async fn execute(
        &self,
        strategy: Strategy,
        input: &Path,
        output: &Path,
        workspace: &Workspace,
    ) -> Result<(), ConversionFailure> {
        self.metrics.record_started(strategy);
        let start = Instant::now();

        let outcome = AssertUnwindSafe(self.run_strategy(strategy, input, output, workspace))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ConversionFailure::unknown(format!(
                    "Conversion process failed: {}",
                    panic_message(panic.as_ref())
                )))
            });

        let result = match outcome {
            Ok(()) => validate_output(output).await,
            Err(failure) => Err(failure),
        };

        let elapsed = start.elapsed();
        match result {
            Ok(bytes) => {
                self.metrics.record_success(elapsed, bytes);
                info!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    output_bytes = bytes,
                    "Conversion succeeded"
                );
                Ok(())
            }
            Err(failure) => {
                self.metrics.record_failure(failure.kind);
                error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    kind = %failure.kind,
                    "Conversion failed"
                );
                Err(failure)
            }
        }
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        input: &Path,
        output: &Path,
        workspace: &Workspace,
    ) -> Result<(), ConversionFailure> {
        match strategy {
            Strategy::CadKernel => self.convert_cad(input, output, workspace).await,
            Strategy::ExternalTool => self.convert_external(input, output).await,
            Strategy::DirectMesh => self.convert_mesh(input, output).await,
        }
    }

    /// Open, check for shapes, export to STEP in the workspace, re-mesh.
    async fn convert_cad(
        &self,
        input: &Path,
        output: &Path,
        workspace: &Workspace,
    ) -> Result<(), ConversionFailure> {
        let document = OpenDocument::new(
            self.cad_kernel
                .open(input)
                .await
                .map_err(|e| ConversionFailure::from_collaborator("CAD kernel open", e))?,
        );

        if document.object_count() == 0 {
            return Err(ConversionFailure::no_geometry(format!(
                "CAD kernel failed to read geometry from: {}",
                input.display()
            )));
        }

        let shapes = document.shapes();
        if shapes.is_empty() {
            return Err(ConversionFailure::no_geometry("No importable shapes found."));
        }

        let intermediate = workspace.join(INTERMEDIATE_FILE);
        document
            .export(&shapes, &intermediate)
            .await
            .map_err(|e| ConversionFailure::from_collaborator("CAD kernel export", e))?;
        document.close();

        self.load_and_export(&intermediate, output).await
    }

    async fn convert_external(&self, input: &Path, output: &Path) -> Result<(), ConversionFailure> {
        let stem = output.with_extension("");
        match self.external_tool.convert(input, &stem).await {
            Ok(_) => Ok(()),
            Err(err) => {
                if matches!(err, ToolError::Timeout { .. }) {
                    self.metrics.record_timeout();
                }
                Err(ConversionFailure::external_tool(err.diagnostic()))
            }
        }
    }

    async fn convert_mesh(&self, input: &Path, output: &Path) -> Result<(), ConversionFailure> {
        self.load_and_export(input, output).await
    }

    async fn load_and_export(&self, source: &Path, output: &Path) -> Result<(), ConversionFailure> {
        let scene = self
            .mesh
            .load(source)
            .await
            .map_err(|e| ConversionFailure::from_collaborator("Mesh load", e))?;
        scene
            .export(output)
            .await
            .map_err(|e| ConversionFailure::from_collaborator("Mesh export", e))
    }
}

/// The collaborator reported success; make sure it actually wrote a file.
async fn validate_output(output: &Path) -> Result<u64, ConversionFailure> {
    match tokio::fs::metadata(output).await {
        Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
        _ => {
            warn!(output = %output.display(), "Collaborator reported success without output");
            Err(ConversionFailure::collaborator(format!(
                "Output file not created: {}",
                output.display()
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCadKernel, FakeExternalTool, FakeMeshProcessor};
    use cadhub_entity::job::FailureKind;

    struct Fixture {
        _root: tempfile::TempDir,
        input: std::path::PathBuf,
        output: std::path::PathBuf,
        temp: std::path::PathBuf,
    }

    fn fixture(input_name: &str) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join(input_name);
        std::fs::write(&input, b"source").unwrap();
        let temp = root.path().join("temp");
        std::fs::create_dir(&temp).unwrap();
        let output = root.path().join("out.glb");
        Fixture {
            input,
            output,
            temp,
            _root: root,
        }
    }

    fn dispatcher(
        cad: FakeCadKernel,
        mesh: FakeMeshProcessor,
        tool: FakeExternalTool,
    ) -> Dispatcher {
        Dispatcher::new(Arc::new(cad), Arc::new(mesh), Arc::new(tool))
    }

    async fn run(d: &Dispatcher, strategy: Strategy, fx: &Fixture) -> Result<(), ConversionFailure> {
        let ws = Workspace::acquire(&fx.temp).await.unwrap();
        let result = d.execute(strategy, &fx.input, &fx.output, &ws).await;
        ws.release().await.unwrap();
        result
    }

    #[tokio::test]
    async fn test_direct_mesh_success() {
        let fx = fixture("mesh.obj");
        let mesh = FakeMeshProcessor::default();
        let d = dispatcher(FakeCadKernel::default(), mesh.clone(), FakeExternalTool::succeeding());

        run(&d, Strategy::DirectMesh, &fx).await.unwrap();

        assert!(fx.output.is_file());
        assert_eq!(mesh.loaded(), vec![fx.input.clone()]);
        let snap = d.metrics().snapshot();
        assert_eq!(snap.conversions_succeeded, 1);
        assert_eq!(snap.direct_mesh_runs, 1);
    }

    #[tokio::test]
    async fn test_cad_document_without_objects() {
        let fx = fixture("part.step");
        let cad = FakeCadKernel::with_objects(&[]);
        let d = dispatcher(cad.clone(), FakeMeshProcessor::default(), FakeExternalTool::succeeding());

        let failure = run(&d, Strategy::CadKernel, &fx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::NoGeometryFound);
        assert!(failure.message.contains("failed to read geometry"));
        assert_eq!(cad.closed_count(), 1);
        assert!(!fx.output.exists());
    }

    #[tokio::test]
    async fn test_cad_document_without_shapes() {
        let fx = fixture("part.step");
        let cad = FakeCadKernel::with_objects(&[("Sketch", false), ("Origin", false)]);
        let d = dispatcher(cad.clone(), FakeMeshProcessor::default(), FakeExternalTool::succeeding());

        let failure = run(&d, Strategy::CadKernel, &fx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::NoGeometryFound);
        assert_eq!(failure.message, "No importable shapes found.");
        assert_eq!(cad.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_cad_goes_through_intermediate_step() {
        let fx = fixture("part.step");
        let cad = FakeCadKernel::with_objects(&[("Body", true), ("Sketch", false)]);
        let mesh = FakeMeshProcessor::default();
        let d = dispatcher(cad.clone(), mesh.clone(), FakeExternalTool::succeeding());

        run(&d, Strategy::CadKernel, &fx).await.unwrap();

        assert!(fx.output.is_file());
        assert_eq!(cad.exported_shapes(), vec!["Body".to_string()]);
        let loaded = mesh.loaded();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].ends_with(INTERMEDIATE_FILE));
        assert!(loaded[0].starts_with(&fx.temp));
        assert_eq!(cad.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_cad_open_failure_is_collaborator_failure() {
        let fx = fixture("part.igs");
        let cad = FakeCadKernel::failing_open("Unknown file type");
        let d = dispatcher(cad, FakeMeshProcessor::default(), FakeExternalTool::succeeding());

        let failure = run(&d, Strategy::CadKernel, &fx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::CollaboratorFailure);
        assert!(failure.message.contains("Unknown file type"));
    }

    #[tokio::test]
    async fn test_cad_export_panic_is_unknown_and_document_closed() {
        let fx = fixture("part.stp");
        let cad = FakeCadKernel::with_objects(&[("Body", true)]).panicking_on_export();
        let d = dispatcher(cad.clone(), FakeMeshProcessor::default(), FakeExternalTool::succeeding());

        let failure = run(&d, Strategy::CadKernel, &fx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unknown);
        assert!(failure.message.contains("kernel exploded"));
        assert_eq!(cad.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_external_tool_failure_keeps_stderr() {
        let fx = fixture("model.fbx");
        let d = dispatcher(
            FakeCadKernel::default(),
            FakeMeshProcessor::default(),
            FakeExternalTool::failing(1, "bad input"),
        );

        let failure = run(&d, Strategy::ExternalTool, &fx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ExternalToolFailure);
        assert!(failure.message.contains("bad input"));
        assert!(failure.message.contains("exit code 1"));
    }

    #[tokio::test]
    async fn test_external_tool_timeout() {
        let fx = fixture("model.fbx");
        let d = dispatcher(
            FakeCadKernel::default(),
            FakeMeshProcessor::default(),
            FakeExternalTool::timing_out(300),
        );

        let failure = run(&d, Strategy::ExternalTool, &fx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ExternalToolFailure);
        assert!(failure.message.contains("timed out after 300s"));
        assert_eq!(d.metrics().snapshot().conversions_timed_out, 1);
    }

    #[tokio::test]
    async fn test_external_tool_receives_stem_and_writes_glb() {
        let fx = fixture("model.fbx");
        let tool = FakeExternalTool::succeeding();
        let d = dispatcher(FakeCadKernel::default(), FakeMeshProcessor::default(), tool.clone());

        run(&d, Strategy::ExternalTool, &fx).await.unwrap();
        assert_eq!(tool.stems(), vec![fx.output.with_extension("")]);
        assert!(fx.output.is_file());
    }

    #[tokio::test]
    async fn test_missing_output_is_collaborator_failure() {
        let fx = fixture("mesh.stl");
        let mesh = FakeMeshProcessor::default().without_output();
        let d = dispatcher(FakeCadKernel::default(), mesh, FakeExternalTool::succeeding());

        let failure = run(&d, Strategy::DirectMesh, &fx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::CollaboratorFailure);
        assert!(failure.message.contains("Output file not created"));
    }

    #[tokio::test]
    async fn test_mesh_export_error_is_collaborator_failure() {
        let fx = fixture("mesh.obj");
        let mesh = FakeMeshProcessor::default().failing_export("degenerate faces");
        let d = dispatcher(FakeCadKernel::default(), mesh, FakeExternalTool::succeeding());

        let failure = run(&d, Strategy::DirectMesh, &fx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::CollaboratorFailure);
        assert_eq!(failure.message, "Mesh export: degenerate faces");
        assert_eq!(d.metrics().snapshot().conversions_failed, 1);
    }
}
