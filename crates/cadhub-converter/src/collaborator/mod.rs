//! Collaborator seams used by the dispatcher.
//!
//! The geometry work itself is done by external software: a CAD kernel,
//! a mesh-processing library, and a command-line converter. Each is a
//! trait here so the dispatcher can be driven by fakes in tests. The
//! default implementations shell out to the real tools.

pub mod cad;
pub mod mesh;
pub mod tool;

use std::ops::Deref;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::executor::{ToolError, ToolOutput};

pub use cad::ScriptedCadKernel;
pub use mesh::TrimeshProcessor;
pub use tool::CommandLineTool;

/// An object in a CAD document that carries shape geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    /// Object name inside the document.
    pub name: String,
}

/// Opens CAD exchange files.
#[async_trait]
pub trait CadKernel: Send + Sync + std::fmt::Debug + 'static {
    /// Open `path` as a document.
    async fn open(&self, path: &Path) -> Result<Box<dyn CadDocument>, CollaboratorError>;
}

/// An open CAD document. Must be closed exactly once.
#[async_trait]
pub trait CadDocument: Send + Sync {
    /// Document name.
    fn name(&self) -> &str;

    /// Number of objects of any kind.
    fn object_count(&self) -> usize;

    /// Objects that carry shape geometry.
    fn shapes(&self) -> Vec<Shape>;

    /// Export `shapes` to an exchange file at `path`.
    async fn export(&self, shapes: &[Shape], path: &Path) -> Result<(), CollaboratorError>;

    /// Release the document.
    fn close(self: Box<Self>);
}

/// Loads mesh or exchange files into scenes.
#[async_trait]
pub trait MeshProcessor: Send + Sync + std::fmt::Debug + 'static {
    /// Load `path` as a scene.
    async fn load(&self, path: &Path) -> Result<Box<dyn Scene>, CollaboratorError>;
}

/// A loaded scene.
#[async_trait]
pub trait Scene: Send + Sync {
    /// Write the scene to `path`; the format follows the extension.
    async fn export(&self, path: &Path) -> Result<(), CollaboratorError>;
}

/// Command-line converter invoked as `<tool> -i <input> -o <output-stem> -b`.
#[async_trait]
pub trait ExternalTool: Send + Sync + std::fmt::Debug + 'static {
    /// Convert `input`, writing `<output_stem>.glb`.
    async fn convert(&self, input: &Path, output_stem: &Path) -> Result<ToolOutput, ToolError>;
}

/// Owns an open document and closes it when dropped.
pub struct OpenDocument {
    inner: Option<Box<dyn CadDocument>>,
}

impl OpenDocument {
    /// Take ownership of `document`.
    pub fn new(document: Box<dyn CadDocument>) -> Self {
        Self {
            inner: Some(document),
        }
    }

    /// Close now instead of at drop.
    pub fn close(mut self) {
        self.close_inner();
    }

    fn close_inner(&mut self) {
        if let Some(document) = self.inner.take() {
            tracing::debug!(document = %document.name(), "Closing CAD document");
            document.close();
        }
    }
}

impl Deref for OpenDocument {
    type Target = dyn CadDocument;

    fn deref(&self) -> &Self::Target {
        match self.inner.as_deref() {
            Some(document) => document,
            None => unreachable!("document is only taken on close"),
        }
    }
}

impl Drop for OpenDocument {
    fn drop(&mut self) {
        self.close_inner();
    }
}
