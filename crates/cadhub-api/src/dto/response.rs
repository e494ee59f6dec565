//! Response DTOs.

use serde::{Deserialize, Serialize};

use cadhub_converter::MetricsSnapshot;
use cadhub_core::types::id::JobId;

/// `202 Accepted` body of `POST /convert`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertResponse {
    /// Identifier to poll.
    pub task_id: JobId,
    /// Relative URL of the status endpoint.
    pub status_url: String,
}

impl ConvertResponse {
    /// Response for a newly queued job.
    pub fn for_job(task_id: JobId) -> Self {
        Self {
            task_id,
            status_url: format!("/status/{task_id}"),
        }
    }
}

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeResponse {
    /// Greeting.
    pub message: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` or `"degraded"`.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Whether the job store answered.
    pub broker: String,
    /// Jobs waiting in the queue, when the backend reports it.
    pub queue_depth: Option<u64>,
    /// Conversion metrics of this process.
    pub conversions: MetricsSnapshot,
}
