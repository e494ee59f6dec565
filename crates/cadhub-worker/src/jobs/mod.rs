//! Job implementations run by the worker.

pub mod conversion;
pub mod purge;
pub mod sweep;

pub use conversion::{ConversionJobHandler, ProcessOutcome};
pub use purge::ExpiredJobPurge;
pub use sweep::WorkspaceSweepJob;
