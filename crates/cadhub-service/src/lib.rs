//! # cadhub-service
//!
//! Business logic between the HTTP surface and the broker:
//! storing uploads, creating and enqueueing jobs, and resolving job status
//! and result artifacts.

pub mod status;
pub mod storage;
pub mod submission;

pub use status::{DownloadTarget, JobStatusView, StatusService};
pub use storage::StorageLayout;
pub use submission::{Submission, SubmissionService};
