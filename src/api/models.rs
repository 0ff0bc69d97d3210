// Request/response bodies for the worker API

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::downloader::{DownloadError, MediaMetadata, StreamFormat};

#[derive(Debug, Deserialize)]
pub struct InfoRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: String,
}

/// One stream variant as exposed to callers. Unknown numeric fields are
/// reported as zero, unknown resolution as "unknown".
#[derive(Debug, Serialize)]
pub struct FormatEntry {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub vcodec: String,
    pub acodec: String,
    pub filesize: u64,
    pub fps: f64,
    pub format: String,
}

impl From<&StreamFormat> for FormatEntry {
    fn from(f: &StreamFormat) -> Self {
        Self {
            format_id: f.format_id.clone(),
            ext: f.ext.clone(),
            resolution: f
                .resolution
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            vcodec: f.vcodec_or_none().to_string(),
            acodec: f.acodec_or_none().to_string(),
            filesize: f.filesize.unwrap_or(0),
            fps: f.fps.unwrap_or(0.0),
            format: f.format.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VideoInfoResponse {
    pub id: String,
    pub title: String,
    pub duration: u64,
    pub thumbnail: String,
    pub uploader: String,
    pub url: String,
    pub formats: Vec<FormatEntry>,
}

impl VideoInfoResponse {
    /// Project engine metadata for the caller, echoing the requested URL.
    pub fn from_metadata(metadata: &MediaMetadata, url: &str) -> Self {
        Self {
            id: metadata.id.clone(),
            title: metadata.title.clone(),
            duration: metadata.duration_seconds,
            thumbnail: metadata.thumbnail.clone(),
            uploader: metadata.uploader.clone(),
            url: url.to_string(),
            formats: metadata.formats.iter().map(FormatEntry::from).collect(),
        }
    }
}

/// Typed API failure: stable machine-readable kind, human-readable message,
/// and a numeric code mirrored in the transport status.
#[derive(Debug)]
pub struct ApiError {
    pub kind: &'static str,
    pub message: String,
    pub status: StatusCode,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    code: u16,
}

impl ApiError {
    pub fn invalid_request(message: &str) -> Self {
        Self {
            kind: "invalid_request",
            message: message.to_string(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn invalid_domain() -> Self {
        Self {
            kind: "invalid_domain",
            message: "Domain is not allowed".to_string(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn fetch_failed(message: String) -> Self {
        Self {
            kind: "fetch_failed",
            message: format!("Failed to fetch video information: {}", message),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn download_failed(message: String) -> Self {
        Self {
            kind: "download_failed",
            message,
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn file_too_large(message: String) -> Self {
        Self {
            kind: "file_too_large",
            message,
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn request_too_large(max_mb: u64) -> Self {
        Self {
            kind: "request_too_large",
            message: format!("Request size exceeds maximum limit of {}MB", max_mb),
            status: StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    pub fn server_error(message: String) -> Self {
        Self {
            kind: "server_error",
            message,
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a body-extraction rejection: oversized payloads keep their 413,
    /// everything else is a missing/invalid field.
    pub fn from_rejection(rejection: JsonRejection, required_fields: &str, max_mb: u64) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::request_too_large(max_mb)
        } else {
            Self::invalid_request(required_fields)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.kind,
            message: &self.message,
            code: self.status.as_u16(),
        });
        (self.status, body).into_response()
    }
}

/// Central mapping from pipeline failures for the metadata endpoint.
pub fn info_error(err: DownloadError) -> ApiError {
    match err {
        DownloadError::InvalidDomain => ApiError::invalid_domain(),
        other => ApiError::fetch_failed(other.to_string()),
    }
}

/// Central mapping from pipeline failures for the download endpoint.
pub fn download_error(err: DownloadError) -> ApiError {
    match err {
        DownloadError::InvalidDomain => ApiError::invalid_domain(),
        DownloadError::FileTooLarge { .. } => ApiError::file_too_large(err.to_string()),
        other => ApiError::download_failed(format!("Download failed: {}", other)),
    }
}
