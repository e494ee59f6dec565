//! Job entity model and its lifecycle transitions.
//!
//! ```text
//! QUEUED --Start--> RUNNING --Succeed--> SUCCEEDED
//!                      |  \--Fail-----> FAILED
//!                      \--Progress (no state change)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cadhub_core::error::AppError;
use cadhub_core::types::id::JobId;

use super::error::JobError;
use super::status::JobState;

/// A conversion job.
///
/// Exactly one of `result_reference` / `error` is set once the job is
/// terminal, and neither is set before that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier, assigned at creation.
    pub id: JobId,
    /// Stored name of the uploaded input artifact.
    pub input_reference: String,
    /// Filename as supplied by the client.
    pub original_name: String,
    /// Current lifecycle state.
    pub state: JobState,
    /// Latest phase string posted while running.
    pub progress_detail: Option<String>,
    /// Path of the produced artifact; only on `SUCCEEDED`.
    pub result_reference: Option<String>,
    /// Failure detail; only on `FAILED`.
    pub error: Option<JobError>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When a worker started the job.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

/// A requested change to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transition {
    /// `QUEUED -> RUNNING`.
    Start,
    /// Replace the progress detail of a running job.
    Progress(String),
    /// `RUNNING -> SUCCEEDED` with the output artifact path.
    Succeed {
        /// Path of the produced artifact.
        result_reference: String,
    },
    /// `RUNNING -> FAILED` with the failure detail.
    Fail(JobError),
}

impl Transition {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Progress(_) => "progress",
            Self::Succeed { .. } => "succeed",
            Self::Fail(_) => "fail",
        }
    }
}

/// Rejected transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The job already reached a terminal state.
    #[error("job {id} is already {state}; no further transitions are allowed")]
    Terminal {
        /// Job identifier.
        id: JobId,
        /// The terminal state.
        state: JobState,
    },
    /// The transition is not defined for the current state.
    #[error("cannot {transition} job {id} in state {state}")]
    Invalid {
        /// Job identifier.
        id: JobId,
        /// Current state.
        state: JobState,
        /// Name of the rejected transition.
        transition: &'static str,
    },
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::conflict(err.to_string())
    }
}

impl Job {
    /// Create a new `QUEUED` job for a stored input.
    pub fn new(input_reference: impl Into<String>, original_name: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            input_reference: input_reference.into(),
            original_name: original_name.into(),
            state: JobState::Queued,
            progress_detail: None,
            result_reference: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Apply a transition, mutating the job only if it is legal.
    pub fn apply(&mut self, transition: Transition) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::Terminal {
                id: self.id,
                state: self.state,
            });
        }

        match (self.state, transition) {
            (JobState::Queued, Transition::Start) => {
                self.state = JobState::Running;
                self.started_at = Some(Utc::now());
            }
            (JobState::Running, Transition::Progress(detail)) => {
                self.progress_detail = Some(detail);
            }
            (JobState::Running, Transition::Succeed { result_reference }) => {
                self.state = JobState::Succeeded;
                self.result_reference = Some(result_reference);
                self.finished_at = Some(Utc::now());
            }
            (JobState::Running, Transition::Fail(error)) => {
                self.state = JobState::Failed;
                self.error = Some(error);
                self.finished_at = Some(Utc::now());
            }
            (state, other) => {
                return Err(TransitionError::Invalid {
                    id: self.id,
                    state,
                    transition: other.name(),
                });
            }
        }

        Ok(())
    }

    /// Whether a finished job has been kept for longer than `retention`.
    ///
    /// Jobs that are still queued or running never expire.
    pub fn is_expired(&self, retention: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.finished_at {
            Some(finished) if self.state.is_terminal() => finished + retention <= now,
            _ => false,
        }
    }

    /// Whether the result/error fields agree with the state.
    pub fn is_consistent(&self) -> bool {
        match self.state {
            JobState::Queued | JobState::Running => {
                self.result_reference.is_none() && self.error.is_none()
            }
            JobState::Succeeded => self.result_reference.is_some() && self.error.is_none(),
            JobState::Failed => self.error.is_some() && self.result_reference.is_none(),
        }
    }
}
