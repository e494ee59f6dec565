//! Broker that wires the configured job store and job queue.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use cadhub_core::config::BrokerConfig;
use cadhub_core::error::AppError;
use cadhub_core::result::AppResult;

use crate::traits::{JobQueue, JobStore};

/// The job store and job queue selected by configuration.
///
/// Cloning is cheap; the gateway and every worker hold a clone.
#[derive(Debug, Clone)]
pub struct Broker {
    /// Job state.
    pub store: Arc<dyn JobStore>,
    /// Work queue.
    pub queue: Arc<dyn JobQueue>,
}

impl Broker {
    /// Create the backends named by `config.provider`.
    pub async fn connect(config: &BrokerConfig) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.dequeue_timeout_seconds);
        let retention = config.result_retention();

        match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis job broker");
                let client = crate::redis::RedisClient::connect(config).await?;
                Ok(Self {
                    store: Arc::new(crate::redis::RedisJobStore::new(client.clone(), retention)),
                    queue: Arc::new(crate::redis::RedisJobQueue::new(client, timeout)),
                })
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory job broker");
                Ok(Self {
                    store: Arc::new(crate::memory::MemoryJobStore::with_retention(retention)),
                    queue: Arc::new(crate::memory::MemoryJobQueue::new(timeout)),
                })
            }
            other => Err(AppError::configuration(format!(
                "Unknown broker provider: '{other}'. Supported: memory, redis"
            ))),
        }
    }

    /// Create an in-process broker.
    #[cfg(feature = "memory")]
    pub fn in_memory(dequeue_timeout: Duration) -> Self {
        Self {
            store: Arc::new(crate::memory::MemoryJobStore::new()),
            queue: Arc::new(crate::memory::MemoryJobQueue::new(dequeue_timeout)),
        }
    }

    /// Create a broker from existing backends (for testing).
    pub fn from_parts(store: Arc<dyn JobStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }
}
