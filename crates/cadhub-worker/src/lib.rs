//! Background conversion processing and scheduled tasks for CadHub.
//!
//! This crate provides:
//! - A worker runner that pulls job ids off the queue and runs them with
//!   bounded concurrency
//! - The per-job conversion pipeline
//! - A cron scheduler for the stale workspace sweep and the expired job purge

pub mod jobs;
pub mod runner;
pub mod scheduler;

pub use jobs::{ConversionJobHandler, ExpiredJobPurge, ProcessOutcome, WorkspaceSweepJob};
pub use runner::WorkerRunner;
pub use scheduler::CronScheduler;
