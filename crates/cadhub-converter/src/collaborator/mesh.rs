//! trimesh-backed mesh processor.
//!
//! Loading only checks that the source is readable; the Python process
//! that exports the scene does the actual `trimesh.load(..., force="scene")`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::{MeshProcessor, Scene};
use crate::error::CollaboratorError;
use crate::executor::Invocation;

const EXPORT_SCRIPT: &str = r#"
import sys
import trimesh
scene = trimesh.load(sys.argv[1], force="scene")
scene.export(file_obj=sys.argv[2])
"#;

/// Mesh processor that runs trimesh in a Python subprocess.
#[derive(Debug, Clone)]
pub struct TrimeshProcessor {
    python: PathBuf,
    timeout: Option<Duration>,
}

impl TrimeshProcessor {
    /// Use the `python` interpreter with an optional per-call limit.
    pub fn new(python: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MeshProcessor for TrimeshProcessor {
    async fn load(&self, path: &Path) -> Result<Box<dyn Scene>, CollaboratorError> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(CollaboratorError::Failed(format!(
                "'{}' is not a file",
                path.display()
            )));
        }
        Ok(Box::new(TrimeshScene {
            processor: self.clone(),
            source: path.to_path_buf(),
        }))
    }
}

#[derive(Debug)]
struct TrimeshScene {
    processor: TrimeshProcessor,
    source: PathBuf,
}

#[async_trait]
impl Scene for TrimeshScene {
    async fn export(&self, path: &Path) -> Result<(), CollaboratorError> {
        Invocation::new(&self.processor.python)
            .arg("-c")
            .arg(EXPORT_SCRIPT)
            .path_arg(&self.source)
            .path_arg(path)
            .timeout(self.processor.timeout)
            .run()
            .await?;
        Ok(())
    }
}
