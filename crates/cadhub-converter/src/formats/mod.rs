//! Extension to conversion strategy classification.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! define_extensions {
    ($($ext:literal => $strategy:ident),* $(,)?) => {
        static EXTENSION_MAP: LazyLock<HashMap<&'static str, Strategy>> = LazyLock::new(|| {
            HashMap::from([$(($ext, Strategy::$strategy),)*])
        });

        impl Strategy {
            /// All file extensions accepted by some strategy.
            pub const SUPPORTED_EXTENSIONS: &'static [&'static str] = &[$($ext,)*];
        }
    };
}

/// Extension of every artifact. The external tool's `-b` flag writes
/// binary glTF, and downloads are served as `model/gltf-binary`.
pub const OUTPUT_EXTENSION: &str = "glb";

define_extensions! {
    "stp"  => CadKernel,
    "step" => CadKernel,
    "igs"  => CadKernel,
    "iges" => CadKernel,
    "fbx"  => ExternalTool,
    "stl"  => DirectMesh,
    "obj"  => DirectMesh,
}

/// Conversion code path selected by input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Open with the CAD kernel, export shapes to STEP, re-mesh.
    CadKernel,
    /// Run the external command-line converter.
    ExternalTool,
    /// Load and export through the mesh processor.
    DirectMesh,
}

impl Strategy {
    /// Stable name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CadKernel => "cad_kernel",
            Self::ExternalTool => "external_tool",
            Self::DirectMesh => "direct_mesh",
        }
    }

    /// Progress string posted while the strategy runs.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::CadKernel => "Converting CAD geometry...",
            Self::ExternalTool => "Running external conversion tool...",
            Self::DirectMesh => "Converting mesh...",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filename not handled by any strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Rejected {
    /// Lowercased extension without the dot; empty when absent.
    pub extension: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Select the strategy for `filename` by its (case-insensitive) extension.
pub fn classify(filename: &str) -> Result<Strategy, Rejected> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let Some(extension) = extension else {
        return Err(Rejected {
            extension: String::new(),
            reason: format!("File '{filename}' has no extension."),
        });
    };

    match EXTENSION_MAP.get(extension.as_str()) {
        Some(strategy) => Ok(*strategy),
        None => Err(Rejected {
            reason: format!("Unsupported file format: '.{extension}'."),
            extension,
        }),
    }
}
