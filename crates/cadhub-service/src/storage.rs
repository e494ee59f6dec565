//! On-disk layout for uploads, converted artifacts, and job workspaces.

use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;

use cadhub_converter::OUTPUT_EXTENSION;
use cadhub_core::config::StorageConfig;
use cadhub_core::error::{AppError, ErrorKind};

/// Resolved storage directories shared by the gateway and the workers.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    uploads: PathBuf,
    converted: PathBuf,
    temp: PathBuf,
}

impl StorageLayout {
    /// Resolve the layout from configuration.
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            uploads: storage.uploads_path(),
            converted: storage.converted_path(),
            temp: storage.temp_path(),
        }
    }

    /// Layout with default directory names under `root`.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        Self::from_config(&StorageConfig::rooted_at(root))
    }

    /// Create every directory. Safe to call more than once.
    pub async fn init(&self) -> Result<(), AppError> {
        for dir in [&self.uploads, &self.converted, &self.temp] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create directory '{}'", dir.display()),
                    e,
                )
            })?;
        }
        info!(
            uploads = %self.uploads.display(),
            converted = %self.converted.display(),
            temp = %self.temp.display(),
            "Storage layout initialized"
        );
        Ok(())
    }

    /// Directory holding uploaded inputs.
    pub fn uploads_dir(&self) -> &Path {
        &self.uploads
    }

    /// Directory holding converted outputs.
    pub fn converted_dir(&self) -> &Path {
        &self.converted
    }

    /// Parent directory of per-job workspaces.
    pub fn temp_dir(&self) -> &Path {
        &self.temp
    }

    /// Path of a stored upload.
    pub fn input_path(&self, input_reference: &str) -> PathBuf {
        self.uploads.join(input_reference)
    }

    /// Output artifact path for a stored upload: `{converted}/{stem}.glb`.
    pub fn output_path(&self, input_reference: &str) -> PathBuf {
        let stem = Path::new(input_reference)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| input_reference.to_string());
        self.converted
            .join(format!("{stem}.{OUTPUT_EXTENSION}"))
    }
}

/// Reduce a client filename to a safe stem.
///
/// Keeps alphanumerics, `-`, `_` and `.`; whitespace becomes `_`.
pub fn sanitize_stem(filename: &str) -> String {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    let sanitized: String = stem
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .take(200)
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        "unnamed_file".to_string()
    } else {
        sanitized
    }
}

/// Collision-resistant stored name: `{stem}_{uuid}{.ext}`.
pub fn stored_name(original_name: &str) -> String {
    let stem = sanitize_stem(original_name);
    let suffix = Uuid::new_v4().simple();
    match Path::new(original_name).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{stem}_{suffix}.{ext}"),
        _ => format!("{stem}_{suffix}"),
    }
}
