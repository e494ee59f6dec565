//! Persisted failure detail of a job.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized category of a conversion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// No strategy handles the input's extension.
    UnsupportedFormat,
    /// The CAD document contained no objects with shape geometry.
    NoGeometryFound,
    /// The external conversion tool exited non-zero.
    ExternalToolFailure,
    /// The CAD-kernel or mesh collaborator reported an error.
    CollaboratorFailure,
    /// A bounded call did not finish in time.
    Timeout,
    /// Anything not anticipated by a strategy.
    Unknown,
}

impl FailureKind {
    /// Return the kind as its wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "UnsupportedFormat",
            Self::NoGeometryFound => "NoGeometryFound",
            Self::ExternalToolFailure => "ExternalToolFailure",
            Self::CollaboratorFailure => "CollaboratorFailure",
            Self::Timeout => "Timeout",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured error stored on a `FAILED` job and exposed verbatim by the
/// status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable diagnostic, including captured tool output.
    pub message: String,
}

impl JobError {
    /// Create a new job error.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
