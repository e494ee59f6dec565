//! Typed path parameter helpers.

use cadhub_core::error::AppError;
use cadhub_core::types::id::JobId;

/// Parses a task id from a path segment.
///
/// A malformed id cannot name any job, so it is reported as not found.
pub fn parse_task_id(s: &str) -> Result<JobId, AppError> {
    s.parse::<JobId>()
        .map_err(|_| AppError::not_found(format!("Task '{s}' not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadhub_core::error::ErrorKind;

    #[test]
    fn test_malformed_id_is_not_found() {
        let err = parse_task_id("not-a-uuid").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_valid_id_parses() {
        let id = JobId::new();
        assert_eq!(parse_task_id(&id.to_string()).unwrap(), id);
    }
}
