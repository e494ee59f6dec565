//! Redis key builders for job records and queues.
//!
//! Keys are relative; the configured prefix is applied by the client.

use cadhub_core::types::id::JobId;

/// Key of a serialized job record.
pub fn job(id: JobId) -> String {
    format!("job:{id}")
}

/// List holding job ids waiting for a worker.
pub const PENDING_QUEUE: &str = "queue:pending";

/// List holding job ids claimed by a worker but not yet acknowledged.
pub const PROCESSING_QUEUE: &str = "queue:processing";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_contains_id() {
        let id = JobId::new();
        assert_eq!(job(id), format!("job:{id}"));
    }
}
