//! # cadhub-converter
//!
//! Everything a worker needs to turn one stored upload into a `.glb`:
//!
//! - [`formats`]: extension to strategy classification
//! - [`workspace`]: per-job scratch directories with guaranteed removal
//! - [`collaborator`]: CAD kernel, mesh processor, and external tool seams
//!   plus their subprocess-backed implementations
//! - [`executor`]: bounded child-process execution with output capture
//! - [`dispatcher`]: runs a strategy and normalizes every failure into a
//!   [`ConversionFailure`]
//! - [`metrics`]: per-process conversion counters

pub mod collaborator;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod formats;
pub mod metrics;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod workspace;

pub use dispatcher::Dispatcher;
pub use error::{CollaboratorError, ConversionFailure};
pub use formats::{OUTPUT_EXTENSION, Rejected, Strategy, classify};
pub use metrics::{ConversionMetrics, MetricsSnapshot};
pub use workspace::Workspace;
