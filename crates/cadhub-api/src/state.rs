//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use cadhub_cache::Broker;
use cadhub_converter::ConversionMetrics;
use cadhub_core::config::AppConfig;
use cadhub_service::{StatusService, StorageLayout, SubmissionService};

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
/// All fields are cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Job store and queue
    pub broker: Broker,
    /// Upload intake
    pub submissions: Arc<SubmissionService>,
    /// Status and download resolution
    pub status: Arc<StatusService>,
    /// Conversion metrics of workers running in this process
    pub metrics: Arc<ConversionMetrics>,
}

impl AppState {
    /// Wire the services over a broker and storage layout.
    pub fn new(
        config: AppConfig,
        broker: Broker,
        layout: StorageLayout,
        metrics: Arc<ConversionMetrics>,
    ) -> Self {
        let submissions = Arc::new(SubmissionService::new(
            Arc::clone(&broker.store),
            Arc::clone(&broker.queue),
            layout,
        ));
        let status = Arc::new(StatusService::new(Arc::clone(&broker.store)));

        Self {
            config: Arc::new(config),
            broker,
            submissions,
            status,
            metrics,
        }
    }
}
