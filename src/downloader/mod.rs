// Download pipeline - orchestration above the external extraction engine

pub mod engine;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod profiles;
pub mod reconciler;
pub mod remux;
pub mod traits;
pub mod utils;

pub use engine::YtDlp;
pub use errors::DownloadError;
pub use models::{Artifact, DownloadRequest, FormatSpec, MediaMetadata, StreamFormat};
pub use orchestrator::Downloader;
pub use profiles::{profile_for, SiteProfile};
pub use remux::FfmpegRemuxer;
pub use traits::{ExtractionEngine, FetchOutcome, Remuxer};
