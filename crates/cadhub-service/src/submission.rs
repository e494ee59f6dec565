//! Submission gateway: store the upload, create the job, enqueue it.

use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument, warn};

use cadhub_cache::{JobQueue, JobStore};
use cadhub_converter::{Strategy, classify};
use cadhub_core::error::AppError;
use cadhub_core::result::AppResult;
use cadhub_core::types::id::JobId;
use cadhub_entity::job::Job;

use crate::storage::{StorageLayout, stored_name};

/// Outcome of an accepted submission.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Identifier of the new `QUEUED` job.
    pub job_id: JobId,
    /// Name the upload was stored under.
    pub input_reference: String,
    /// Strategy the input will be converted with.
    pub strategy: Strategy,
    /// Bytes written.
    pub size: u64,
}

/// Accepts uploads and turns them into queued jobs.
///
/// Never waits for conversion.
#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    layout: StorageLayout,
}

impl std::fmt::Debug for SubmissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionService")
            .field("uploads", &self.layout.uploads_dir())
            .finish()
    }
}

impl SubmissionService {
    /// Creates a new submission service.
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn JobQueue>, layout: StorageLayout) -> Self {
        Self {
            store,
            queue,
            layout,
        }
    }

    /// Submit an in-memory upload.
    pub async fn submit(&self, filename: &str, data: Bytes) -> AppResult<Submission> {
        self.submit_stream(filename, futures::stream::once(async move { Ok(data) }))
            .await
    }

    /// Submit an upload arriving as a stream of chunks.
    ///
    /// Unsupported formats are rejected before anything is written. Any
    /// later failure removes the stored file, and a job that could not be
    /// enqueued is deleted again so no `QUEUED` record is left unreachable.
    #[instrument(skip(self, chunks))]
    pub async fn submit_stream<S>(&self, filename: &str, chunks: S) -> AppResult<Submission>
    where
        S: Stream<Item = AppResult<Bytes>> + Send,
    {
        let original_name = client_file_name(filename)?;
        let strategy =
            classify(&original_name).map_err(|r| AppError::unsupported_format(r.reason))?;

        let input_reference = stored_name(&original_name);
        let path = self.layout.input_path(&input_reference);

        let size = match write_chunks(&path, chunks).await {
            Ok(size) => size,
            Err(e) => {
                discard_upload(&path).await;
                return Err(e);
            }
        };

        let job = Job::new(&input_reference, &original_name);
        let job_id = job.id;
        if let Err(e) = self.store.create(&job).await {
            error!(job_id = %job_id, error = %e, "Failed to create job");
            discard_upload(&path).await;
            return Err(e);
        }

        if let Err(e) = self.queue.enqueue(job_id).await {
            error!(job_id = %job_id, error = %e, "Failed to enqueue job");
            if let Err(del) = self.store.delete(job_id).await {
                warn!(job_id = %job_id, error = %del, "Failed to delete unqueued job");
            }
            discard_upload(&path).await;
            return Err(AppError::service_unavailable(format!(
                "Failed to process file: {}",
                e.message
            )));
        }

        info!(
            job_id = %job_id,
            input = %input_reference,
            strategy = %strategy,
            size,
            "Conversion job submitted"
        );

        Ok(Submission {
            job_id,
            input_reference,
            strategy,
            size,
        })
    }
}

/// The last path component of a client-supplied filename.
fn client_file_name(filename: &str) -> AppResult<String> {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() {
        return Err(AppError::validation("No file name provided"));
    }
    Ok(name.to_string())
}

async fn discard_upload(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove upload");
        }
    }
}

async fn write_chunks<S>(path: &std::path::Path, chunks: S) -> AppResult<u64>
where
    S: Stream<Item = AppResult<Bytes>> + Send,
{
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| AppError::storage(format!("Failed to store upload: {e}")))?;

    let mut size = 0u64;
    let mut chunks = std::pin::pin!(chunks);
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::storage(format!("Failed to store upload: {e}")))?;
        size += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| AppError::storage(format!("Failed to store upload: {e}")))?;
    Ok(size)
}
