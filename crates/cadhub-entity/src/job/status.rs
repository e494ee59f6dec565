//! Job lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a conversion job.
///
/// `Queued` is initial; `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Accepted and waiting for a worker.
    Queued,
    /// Claimed by a worker; collaborators may be running.
    Running,
    /// Finished with a result artifact.
    Succeeded,
    /// Finished with a conversion failure.
    Failed,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Return the state as its wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
