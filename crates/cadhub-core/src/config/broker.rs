//! Job store and queue backend configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where job state and the work queue live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Backend: `"memory"` (single process) or `"redis"` (shared).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Redis connection URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Prefix applied to every Redis key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// How long a dequeue waits before reporting an empty queue.
    #[serde(default = "default_dequeue_timeout")]
    pub dequeue_timeout_seconds: u64,
    /// How long a finished job stays queryable before it is dropped.
    #[serde(default = "default_result_retention")]
    pub result_retention_seconds: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_url(),
            key_prefix: default_key_prefix(),
            dequeue_timeout_seconds: default_dequeue_timeout(),
            result_retention_seconds: default_result_retention(),
        }
    }
}

impl BrokerConfig {
    /// Whether job state is visible to other processes.
    pub fn is_shared(&self) -> bool {
        self.provider == "redis"
    }

    /// Retention of finished jobs, at least one second.
    pub fn result_retention(&self) -> Duration {
        Duration::from_secs(self.result_retention_seconds.max(1))
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_key_prefix() -> String {
    "cadhub:".to_string()
}

fn default_dequeue_timeout() -> u64 {
    5
}

fn default_result_retention() -> u64 {
    86_400
}
