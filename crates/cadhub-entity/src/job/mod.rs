//! Conversion job domain entities.

pub mod error;
pub mod model;
pub mod status;

pub use error::{FailureKind, JobError};
pub use model::{Job, Transition, TransitionError};
pub use status::JobState;
