// ffmpeg-backed container normalization

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tracing::debug;

use super::errors::DownloadError;
use super::traits::Remuxer;

/// Remuxer backed by the ffmpeg binary. Stream copy only, never re-encodes.
pub struct FfmpegRemuxer {
    binary: String,
}

impl FfmpegRemuxer {
    pub fn new() -> Self {
        Self {
            binary: Self::find_ffmpeg(),
        }
    }

    /// Find the ffmpeg binary in common install locations, then PATH.
    fn find_ffmpeg() -> String {
        let common_paths = [
            "/opt/homebrew/bin/ffmpeg",
            "/usr/local/bin/ffmpeg",
            "/usr/bin/ffmpeg",
        ];

        for path in common_paths {
            if Path::new(path).exists() {
                return path.to_string();
            }
        }

        if let Ok(output) = std::process::Command::new("which").arg("ffmpeg").output() {
            if output.status.success() {
                if let Ok(path) = String::from_utf8(output.stdout) {
                    let trimmed = path.trim();
                    if !trimmed.is_empty() {
                        return trimmed.to_string();
                    }
                }
            }
        }

        "ffmpeg".to_string()
    }
}

impl Default for FfmpegRemuxer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(&self, input: &Path, output: &Path) -> Result<(), DownloadError> {
        debug!(input = %input.display(), output = %output.display(), "remuxing container");

        let status = TokioCommand::new(&self.binary)
            .arg("-i")
            .arg(input)
            .arg("-c")
            .arg("copy")
            .arg("-y")
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                DownloadError::ExecutionError(format!("Failed to start {}: {}", self.binary, e))
            })?;

        if !status.success() {
            return Err(DownloadError::ExecutionError(format!(
                "ffmpeg exited with {}",
                status
            )));
        }

        Ok(())
    }
}
