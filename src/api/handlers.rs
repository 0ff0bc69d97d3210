// HTTP handlers for the worker API

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::api::models::{
    download_error, info_error, ApiError, HealthResponse, InfoRequest, VideoInfoResponse,
};
use crate::config::Config;
use crate::downloader::{DownloadRequest, Downloader};

const SERVICE_NAME: &str = "mediagrab-worker";

pub struct AppState {
    pub downloader: Downloader,
    pub config: Config,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        timestamp: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
    })
}

/// POST /api/info
pub async fn video_info(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InfoRequest>, JsonRejection>,
) -> Result<Json<VideoInfoResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::from_rejection(rejection, "URL is required", state.config.max_request_size_mb)
    })?;

    info!(url = %request.url, "info requested");
    let metadata = state
        .downloader
        .fetch_metadata(&request.url)
        .await
        .map_err(info_error)?;

    Ok(Json(VideoInfoResponse::from_metadata(
        &metadata,
        &request.url,
    )))
}

/// POST /api/download
///
/// Streams the finished artifact back as an attachment named by its
/// sanitized basename; the directory path never leaves this process.
pub async fn download_video(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::from_rejection(
            rejection,
            "URL and format_id are required",
            state.config.max_request_size_mb,
        )
    })?;

    info!(url = %request.url, format_id = %request.format_id, "download requested");
    let artifact = state
        .downloader
        .download(&request)
        .await
        .map_err(download_error)?;

    let bytes = tokio::fs::read(&artifact.path).await.map_err(|e| {
        error!(path = %artifact.path.display(), %e, "failed to read finished artifact");
        ApiError::server_error("Internal server error".to_string())
    })?;

    let headers = [
        (
            header::CONTENT_TYPE,
            "application/octet-stream".to_string(),
        ),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.file_name),
        ),
    ];
    Ok((headers, bytes).into_response())
}
