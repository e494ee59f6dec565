//! Filesystem layout configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Roots for uploaded inputs, converted outputs, and job workspaces.
///
/// Relative sub-directories are resolved under `data_root`; absolute ones
/// are used as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all runtime data.
    #[serde(default = "default_data_root")]
    pub data_root: String,
    /// Directory holding uploaded input artifacts.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
    /// Directory holding converted output artifacts.
    #[serde(default = "default_converted_dir")]
    pub converted_dir: String,
    /// Parent directory for per-job workspaces.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            uploads_dir: default_uploads_dir(),
            converted_dir: default_converted_dir(),
            temp_dir: default_temp_dir(),
        }
    }
}

impl StorageConfig {
    /// Storage rooted at `data_root` with the default sub-directory names.
    pub fn rooted_at(data_root: impl AsRef<Path>) -> Self {
        Self {
            data_root: data_root.as_ref().to_string_lossy().to_string(),
            ..Self::default()
        }
    }

    /// Resolved uploads directory.
    pub fn uploads_path(&self) -> PathBuf {
        self.resolve(&self.uploads_dir)
    }

    /// Resolved converted-output directory.
    pub fn converted_path(&self) -> PathBuf {
        self.resolve(&self.converted_dir)
    }

    /// Resolved workspace parent directory.
    pub fn temp_path(&self) -> PathBuf {
        self.resolve(&self.temp_dir)
    }

    fn resolve(&self, dir: &str) -> PathBuf {
        let path = Path::new(dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.data_root).join(path)
        }
    }
}

fn default_data_root() -> String {
    "./data".to_string()
}

fn default_uploads_dir() -> String {
    "uploads".to_string()
}

fn default_converted_dir() -> String {
    "converted".to_string()
}

fn default_temp_dir() -> String {
    "temp".to_string()
}
