//! Conversion submission handler.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use futures::StreamExt;

use cadhub_core::error::AppError;

use crate::dto::response::ConvertResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

/// POST /convert
///
/// Streams the `file` field to storage, queues a job, and answers
/// `202 Accepted` without waiting for the conversion.
pub async fn convert(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ConvertResponse>), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::validation("No file name provided"))?;

        let chunks = field.map(|chunk| chunk.map_err(multipart_error));
        let submission = state.submissions.submit_stream(&filename, chunks).await?;

        return Ok((
            StatusCode::ACCEPTED,
            Json(ConvertResponse::for_job(submission.job_id)),
        ));
    }

    Err(AppError::validation(format!("Missing '{FILE_FIELD}' field in multipart body")).into())
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::payload_too_large("Upload exceeds the maximum allowed size")
    } else {
        AppError::validation(format!("Multipart error: {}", e.body_text()))
    }
}
