// Common data models for the download pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One stream variant reported by the extraction engine.
///
/// Codec fields mirror the engine's convention: `"none"` (or a missing
/// value) means the track is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFormat {
    pub format_id: String,
    pub ext: String,
    pub resolution: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
    pub fps: Option<f64>,
    /// Human-readable format label from the engine
    pub format: Option<String>,
}

impl StreamFormat {
    pub fn vcodec_or_none(&self) -> &str {
        self.vcodec.as_deref().unwrap_or("none")
    }

    pub fn acodec_or_none(&self) -> &str {
        self.acodec.as_deref().unwrap_or("none")
    }

    /// Carries a video track but no audio track, so it must be paired with
    /// an audio source before it is a satisfactory final artifact.
    pub fn is_video_only(&self) -> bool {
        self.vcodec_or_none() != "none" && self.acodec_or_none() == "none"
    }

    pub fn has_audio(&self) -> bool {
        self.acodec_or_none() != "none"
    }
}

/// Metadata for one media page, as reported by the extraction engine.
#[derive(Debug, Clone)]
pub struct MediaMetadata {
    pub id: String,
    pub title: String,
    pub duration_seconds: u64,
    pub thumbnail: String,
    pub uploader: String,
    pub webpage_url: String,
    pub formats: Vec<StreamFormat>,
}

/// Inbound download request, validated before any side effect.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub format_id: String,
    /// Quality label appended to the final filename (e.g. "720p")
    pub quality: Option<String>,
}

/// Resolved engine format specification: either a single format id, or a
/// composite `"{id}+bestaudio/best"` pairing that requires a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec(String);

impl FormatSpec {
    pub fn single(format_id: &str) -> Self {
        Self(format_id.to_string())
    }

    /// Pair the video stream with the best available audio stream, falling
    /// back to the engine's overall best pairing.
    pub fn merged_with_audio(format_id: &str) -> Self {
        Self(format!("{}+bestaudio/best", format_id))
    }

    /// The engine's own "best available" policy, used as the download
    /// fallback after a format-specific failure.
    pub fn best() -> Self {
        Self("best".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Composite specs carry the `+` merge-join marker.
    pub fn is_merge(&self) -> bool {
        self.0.contains('+')
    }
}

/// The file produced on persistent storage, handed to the caller on success.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Basename only; the directory path is never exposed to the caller
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}
