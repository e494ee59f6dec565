//! In-process collaborator fakes for dispatcher and worker tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborator::{CadDocument, CadKernel, ExternalTool, MeshProcessor, Scene, Shape};
use crate::error::CollaboratorError;
use crate::executor::{ToolError, ToolOutput};

/// Minimal binary glTF header written by the fakes.
pub const FAKE_GLB: &[u8] = b"glTF\x02\x00\x00\x00";

fn lock<T: Clone>(m: &Mutex<T>) -> T {
    m.lock().map(|v| v.clone()).unwrap_or_else(|p| p.into_inner().clone())
}

/// CAD kernel returning a fixed object inventory.
#[derive(Debug, Clone, Default)]
pub struct FakeCadKernel {
    objects: Vec<(String, bool)>,
    open_error: Option<String>,
    panic_on_export: bool,
    closed: Arc<AtomicUsize>,
    exported: Arc<Mutex<Vec<String>>>,
}

impl FakeCadKernel {
    /// Documents contain `(name, has_shape)` objects.
    pub fn with_objects(objects: &[(&str, bool)]) -> Self {
        Self {
            objects: objects
                .iter()
                .map(|(name, shape)| (name.to_string(), *shape))
                .collect(),
            ..Self::default()
        }
    }

    /// Opening fails with `message`.
    pub fn failing_open(message: &str) -> Self {
        Self {
            open_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Exporting panics.
    pub fn panicking_on_export(mut self) -> Self {
        self.panic_on_export = true;
        self
    }

    /// How many documents were closed.
    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Names of shapes passed to export.
    pub fn exported_shapes(&self) -> Vec<String> {
        lock(&self.exported)
    }
}

#[async_trait]
impl CadKernel for FakeCadKernel {
    async fn open(&self, path: &Path) -> Result<Box<dyn CadDocument>, CollaboratorError> {
        if let Some(ref message) = self.open_error {
            return Err(CollaboratorError::Failed(message.clone()));
        }
        Ok(Box::new(FakeDocument {
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            kernel: self.clone(),
        }))
    }
}

struct FakeDocument {
    name: String,
    kernel: FakeCadKernel,
}

#[async_trait]
impl CadDocument for FakeDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn object_count(&self) -> usize {
        self.kernel.objects.len()
    }

    fn shapes(&self) -> Vec<Shape> {
        self.kernel
            .objects
            .iter()
            .filter(|(_, shape)| *shape)
            .map(|(name, _)| Shape { name: name.clone() })
            .collect()
    }

    async fn export(&self, shapes: &[Shape], path: &Path) -> Result<(), CollaboratorError> {
        if self.kernel.panic_on_export {
            panic!("kernel exploded");
        }
        if let Ok(mut exported) = self.kernel.exported.lock() {
            exported.extend(shapes.iter().map(|s| s.name.clone()));
        }
        tokio::fs::write(path, b"ISO-10303-21;").await?;
        Ok(())
    }

    fn close(self: Box<Self>) {
        self.kernel.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Mesh processor that writes [`FAKE_GLB`] on export.
#[derive(Debug, Clone, Default)]
pub struct FakeMeshProcessor {
    export_error: Option<String>,
    skip_write: bool,
    delay: Option<Duration>,
    loaded: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeMeshProcessor {
    /// Exporting fails with `message`.
    pub fn failing_export(mut self, message: &str) -> Self {
        self.export_error = Some(message.to_string());
        self
    }

    /// Exporting reports success without writing anything.
    pub fn without_output(mut self) -> Self {
        self.skip_write = true;
        self
    }

    /// Exporting sleeps first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Paths passed to `load`, in order.
    pub fn loaded(&self) -> Vec<PathBuf> {
        lock(&self.loaded)
    }
}

#[async_trait]
impl MeshProcessor for FakeMeshProcessor {
    async fn load(&self, path: &Path) -> Result<Box<dyn Scene>, CollaboratorError> {
        tokio::fs::metadata(path).await?;
        if let Ok(mut loaded) = self.loaded.lock() {
            loaded.push(path.to_path_buf());
        }
        Ok(Box::new(FakeScene {
            processor: self.clone(),
        }))
    }
}

struct FakeScene {
    processor: FakeMeshProcessor,
}

#[async_trait]
impl Scene for FakeScene {
    async fn export(&self, path: &Path) -> Result<(), CollaboratorError> {
        if let Some(delay) = self.processor.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref message) = self.processor.export_error {
            return Err(CollaboratorError::Failed(message.clone()));
        }
        if !self.processor.skip_write {
            tokio::fs::write(path, FAKE_GLB).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum ToolBehavior {
    Succeed,
    Fail { code: i32, stderr: String },
    Timeout { seconds: u64 },
}

/// External tool with scripted behavior.
#[derive(Debug, Clone)]
pub struct FakeExternalTool {
    behavior: ToolBehavior,
    stems: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeExternalTool {
    /// Writes `<stem>.glb` and exits 0.
    pub fn succeeding() -> Self {
        Self::with(ToolBehavior::Succeed)
    }

    /// Exits with `code`, printing `stderr`.
    pub fn failing(code: i32, stderr: &str) -> Self {
        Self::with(ToolBehavior::Fail {
            code,
            stderr: stderr.to_string(),
        })
    }

    /// Hits its time limit.
    pub fn timing_out(seconds: u64) -> Self {
        Self::with(ToolBehavior::Timeout { seconds })
    }

    fn with(behavior: ToolBehavior) -> Self {
        Self {
            behavior,
            stems: Arc::default(),
        }
    }

    /// Output stems the tool was invoked with.
    pub fn stems(&self) -> Vec<PathBuf> {
        lock(&self.stems)
    }
}

#[async_trait]
impl ExternalTool for FakeExternalTool {
    async fn convert(&self, _input: &Path, output_stem: &Path) -> Result<ToolOutput, ToolError> {
        if let Ok(mut stems) = self.stems.lock() {
            stems.push(output_stem.to_path_buf());
        }
        match &self.behavior {
            ToolBehavior::Succeed => {
                let target = output_stem.with_extension("glb");
                tokio::fs::write(&target, FAKE_GLB)
                    .await
                    .map_err(|source| ToolError::Io {
                        tool: "FBX2glTF".to_string(),
                        source,
                    })?;
                Ok(ToolOutput::default())
            }
            ToolBehavior::Fail { code, stderr } => Err(ToolError::Failed {
                tool: "FBX2glTF".to_string(),
                code: Some(*code),
                stdout: String::new(),
                stderr: stderr.clone(),
            }),
            ToolBehavior::Timeout { seconds } => Err(ToolError::Timeout {
                tool: "FBX2glTF".to_string(),
                seconds: *seconds,
            }),
        }
    }
}
