use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use crate::error::{AppError, AppResult};
use crate::metrics::count_request;
use crate::models::ChunkRequest;
use crate::state::AppState;
use crate::upload::{ChunkOutcome, InitUpload};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/init", post(init_handler))
        .route("/chunk/{upload_id}", post(chunk_handler))
        .route("/status/{upload_id}", get(status_handler))
        .route("/pause/{upload_id}", post(pause_handler))
        .route("/resume/{upload_id}", post(resume_handler))
        .route("/cancel/{upload_id}", delete(cancel_handler))
        .route("/processed/{upload_id}", get(processed_handler))
}

async fn init_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InitUpload>,
) -> AppResult<impl IntoResponse> {
    count_request("upload");
    let outcome = state.uploads.init(request)?;

    Ok(Json(json!({
        "uploadId": outcome.upload_id,
        "message": "Upload session initialized",
        "totalChunks": outcome.total_chunks,
        "chunkSize": outcome.chunk_size,
        "nextChunk": outcome.next_chunk,
        "chunks": outcome.chunks
    })))
}

async fn chunk_handler(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
    Json(request): Json<ChunkRequest>,
) -> AppResult<impl IntoResponse> {
    count_request("upload");
    let index = request
        .chunk_index
        .ok_or_else(|| AppError::BadRequest("chunkIndex is required".into()))?;
    debug!(
        %upload_id,
        index,
        size = ?request.chunk_size,
        checksum = ?request.checksum,
        "chunk received"
    );

    let body = match state.uploads.submit_chunk(&upload_id, index).await? {
        ChunkOutcome::Complete { chunks } => json!({
            "success": true,
            "progress": 100,
            "status": "complete",
            "message": "Upload complete, starting processing...",
            "chunks": chunks
        }),
        ChunkOutcome::Progress(progress) => json!({
            "success": true,
            "chunkIndex": progress.chunk_index,
            "uploadedChunks": progress.uploaded_chunks,
            "totalChunks": progress.total_chunks,
            "progress": progress.progress,
            "nextChunk": progress.next_chunk,
            "estimatedTimeRemaining": progress.estimated_time_remaining,
            "chunks": progress.chunks
        }),
    };

    Ok(Json(body))
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.uploads.status(&upload_id)?))
}

async fn pause_handler(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let paused = state.uploads.pause(&upload_id)?;

    Ok(Json(json!({
        "message": "Upload paused",
        "status": paused.status,
        "uploadedChunks": paused.uploaded_chunks,
        "nextChunk": paused.next_chunk
    })))
}

async fn resume_handler(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let resumed = state.uploads.resume(&upload_id)?;

    Ok(Json(json!({
        "message": "Upload resumed",
        "status": resumed.status,
        "nextChunk": resumed.next_chunk
    })))
}

async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.uploads.cancel(&upload_id)?;
    Ok(Json(json!({ "message": "Upload cancelled and cleaned up" })))
}

async fn processed_handler(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.uploads.processed(&upload_id)?))
}
