//! Background worker configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Conversion worker pool configuration.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether workers run in this process.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of concurrent worker loops.
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 64))]
    pub concurrency: usize,
    /// Time allowed for in-flight jobs after a shutdown signal.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// Cron expression for the stale workspace sweep.
    #[serde(default = "default_sweep_cron")]
    pub workspace_sweep_cron: String,
    /// Workspaces older than this are considered abandoned.
    #[serde(default = "default_stale_minutes")]
    #[validate(range(min = 1))]
    pub stale_workspace_minutes: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            concurrency: default_concurrency(),
            shutdown_grace_seconds: default_shutdown_grace(),
            workspace_sweep_cron: default_sweep_cron(),
            stale_workspace_minutes: default_stale_minutes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    2
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_sweep_cron() -> String {
    "0 */30 * * * *".to_string()
}

fn default_stale_minutes() -> u64 {
    120
}
