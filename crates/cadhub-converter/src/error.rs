//! Conversion failure values.
//!
//! A [`ConversionFailure`] is the only error a strategy may produce. It is
//! persisted on the job rather than propagated as an `AppError`.
//! Collaborators report [`CollaboratorError`]s which the dispatcher
//! classifies on the way out.

use thiserror::Error;

use cadhub_entity::job::{FailureKind, JobError};

use crate::executor::ToolError;
use crate::formats::Rejected;

/// Normalized outcome of a failed conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ConversionFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Diagnostic text, kept verbatim.
    pub message: String,
}

impl ConversionFailure {
    /// Create a failure of the given kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The document opened but holds nothing exportable.
    pub fn no_geometry(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NoGeometryFound, message)
    }

    /// The external tool failed or timed out.
    pub fn external_tool(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ExternalToolFailure, message)
    }

    /// A library collaborator reported an error.
    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::new(FailureKind::CollaboratorFailure, message)
    }

    /// Anything unanticipated.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, message)
    }

    /// Classify a collaborator error raised during `stage`.
    pub fn from_collaborator(stage: &str, err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Timeout { .. } => {
                Self::new(FailureKind::Timeout, format!("{stage}: {err}"))
            }
            other => Self::collaborator(format!("{stage}: {other}")),
        }
    }
}

impl From<Rejected> for ConversionFailure {
    fn from(rejected: Rejected) -> Self {
        Self::new(FailureKind::UnsupportedFormat, rejected.reason)
    }
}

impl From<ConversionFailure> for JobError {
    fn from(failure: ConversionFailure) -> Self {
        JobError::new(failure.kind, failure.message)
    }
}

/// Error reported by a CAD-kernel or mesh-processing collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The collaborator ran and reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The collaborator did not finish within its time limit.
    #[error("{collaborator} timed out after {seconds}s")]
    Timeout {
        /// Collaborator name.
        collaborator: String,
        /// The limit that was exceeded.
        seconds: u64,
    },

    /// Filesystem error around the collaborator call.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ToolError> for CollaboratorError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Timeout { tool, seconds } => Self::Timeout {
                collaborator: tool,
                seconds,
            },
            other => Self::Failed(other.diagnostic()),
        }
    }
}
