// Trait seams for the external engine and remux tool

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::errors::DownloadError;
use super::models::MediaMetadata;
use super::profiles::SiteProfile;

/// Result of one engine fetch invocation.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Output path as resolved by the engine itself, when it reported one
    pub produced_path: Option<PathBuf>,
}

/// The external extraction capability: given a URL and a request profile,
/// report stream metadata or perform an actual download.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Metadata-only extraction; no file is downloaded.
    async fn probe(
        &self,
        url: &str,
        profile: &SiteProfile,
    ) -> Result<MediaMetadata, DownloadError>;

    /// Download the given format spec into `output_dir`, named after the
    /// source title with its natural extension.
    async fn fetch(
        &self,
        url: &str,
        profile: &SiteProfile,
        format_spec: &str,
        output_dir: &Path,
    ) -> Result<FetchOutcome, DownloadError>;
}

/// The external remux capability: losslessly repackage a file into another
/// container (stream copy, no re-encode).
#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn remux(&self, input: &Path, output: &Path) -> Result<(), DownloadError>;
}
