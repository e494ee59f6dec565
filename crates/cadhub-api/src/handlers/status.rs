//! Status polling and result download handlers.

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use tokio_util::io::ReaderStream;

use cadhub_core::error::AppError;
use cadhub_service::JobStatusView;

use crate::error::ApiError;
use crate::extractors::parse_task_id;
use crate::state::AppState;

/// GET /status/{task_id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    let id = parse_task_id(&task_id)?;
    let view = state.status.status(id).await?;
    Ok(Json(view))
}

/// GET /download/{task_id}
pub async fn download(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_task_id(&task_id)?;
    let target = state.status.download(id).await?;

    let file = tokio::fs::File::open(&target.path)
        .await
        .map_err(|_| AppError::not_found("Converted file not found."))?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, target.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", target.filename),
        )
        .header(header::CONTENT_LENGTH, target.size)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::internal(format!("Response build failed: {e}")))?;

    Ok(response)
}
