//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section; every section has defaults so an empty configuration is valid.

pub mod app;
pub mod broker;
pub mod conversion;
pub mod logging;
pub mod storage;
pub mod worker;

use std::path::Path;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use self::app::{CorsConfig, ServerConfig};
pub use self::broker::BrokerConfig;
pub use self::conversion::ConversionConfig;
pub use self::logging::LoggingConfig;
pub use self::storage::StorageConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay) and
/// `CADHUB__*` environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Filesystem layout.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Job store and queue backend.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Conversion collaborator settings.
    #[serde(default)]
    pub conversion: ConversionConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from `config/` in the working directory.
    pub fn load(env: &str) -> Result<Self, AppError> {
        Self::load_from(Path::new("config"), env)
    }

    /// Load configuration from TOML files in `dir`.
    ///
    /// Merges `default.toml` with an environment-specific overlay and
    /// environment variables prefixed with `CADHUB__`.
    pub fn load_from(dir: &Path, env: &str) -> Result<Self, AppError> {
        let default_file = dir.join("default");
        let env_file = dir.join(env);

        let config = config::Config::builder()
            .add_source(config::File::with_name(&default_file.to_string_lossy()).required(false))
            .add_source(config::File::with_name(&env_file.to_string_lossy()).required(false))
            .add_source(
                config::Environment::with_prefix("CADHUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Validate the sections that carry range constraints.
    pub fn validate(&self) -> Result<(), AppError> {
        self.worker.validate()?;
        self.conversion.validate()?;

        let stale_after = self.worker.stale_workspace_minutes.saturating_mul(60);
        let longest_step = self.conversion.longest_step_seconds();
        if longest_step >= stale_after {
            return Err(AppError::configuration(format!(
                "worker.stale_workspace_minutes ({} min) must exceed the longest \
                 conversion timeout ({longest_step}s)",
                self.worker.stale_workspace_minutes
            )));
        }

        match self.broker.provider.as_str() {
            "memory" | "redis" => Ok(()),
            other => Err(AppError::configuration(format!(
                "Unknown broker provider: '{other}'. Supported: memory, redis"
            ))),
        }
    }
}
