//! Convenience result type alias for CadHub.

use crate::error::AppError;

/// A specialized `Result` type for CadHub operations.
pub type AppResult<T> = Result<T, AppError>;
