// yt-dlp extraction engine - uses the native `yt-dlp` binary

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use super::errors::DownloadError;
use super::models::{MediaMetadata, StreamFormat};
use super::profiles::{SiteProfile, ACCEPT_LANGUAGE, USER_AGENT};
use super::traits::{ExtractionEngine, FetchOutcome};
use super::utils::run_output_with_timeout;

/// Socket timeout applied to every download invocation, regardless of the
/// site profile's probe timeout.
const DOWNLOAD_SOCKET_TIMEOUT_SECS: u64 = 60;

/// Output filename template: source title with its natural extension.
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

lazy_static! {
    static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
    static ref MERGE_RE: Regex =
        Regex::new(r#"\[Merger\]\s+Merging formats into "(.+)""#).unwrap();
    static ref ALREADY_RE: Regex =
        Regex::new(r"\[download\]\s+(.+?)\s+has already been downloaded").unwrap();
}

/// Tracks the engine's own filename resolution across its output lines.
///
/// The merger line names the final file when streams were combined; the
/// last destination line covers single-stream downloads; the
/// "already downloaded" line covers reruns over an existing file.
#[derive(Debug, Default)]
pub struct OutputScanner {
    destination: Option<PathBuf>,
    merged: Option<PathBuf>,
}

impl OutputScanner {
    pub fn observe(&mut self, line: &str) {
        if let Some(caps) = MERGE_RE.captures(line) {
            self.merged = Some(PathBuf::from(caps[1].trim()));
        } else if let Some(caps) = DEST_RE.captures(line) {
            self.destination = Some(PathBuf::from(caps[1].trim()));
        } else if let Some(caps) = ALREADY_RE.captures(line) {
            self.destination = Some(PathBuf::from(caps[1].trim()));
        }
    }

    pub fn into_path(self) -> Option<PathBuf> {
        self.merged.or(self.destination)
    }
}

/// Extraction engine backed by the yt-dlp binary.
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new() -> Self {
        Self {
            binary: Self::find_ytdlp(),
        }
    }

    /// Find the yt-dlp binary in common install locations, then PATH.
    fn find_ytdlp() -> String {
        let common_paths = [
            "/opt/homebrew/bin/yt-dlp",
            "/usr/local/bin/yt-dlp",
            "/usr/bin/yt-dlp",
        ];

        for path in common_paths {
            if Path::new(path).exists() {
                return path.to_string();
            }
        }

        if let Ok(output) = std::process::Command::new("which").arg("yt-dlp").output() {
            if output.status.success() {
                if let Ok(path) = String::from_utf8(output.stdout) {
                    let trimmed = path.trim();
                    if !trimmed.is_empty() {
                        return trimmed.to_string();
                    }
                }
            }
        }

        "yt-dlp".to_string()
    }

    /// Arguments shared by probe and fetch, derived from the site profile.
    fn profile_args(profile: &SiteProfile, socket_timeout_secs: u64) -> Vec<String> {
        let mut args = vec!["--no-playlist".to_string()];

        if profile.quiet {
            args.push("--quiet".to_string());
            args.push("--no-warnings".to_string());
        }

        args.push("--socket-timeout".to_string());
        args.push(socket_timeout_secs.to_string());

        if profile.retries > 0 {
            args.push("--retries".to_string());
            args.push(profile.retries.to_string());
        }

        if let Some(n) = profile.fragment_retries {
            args.push("--fragment-retries".to_string());
            args.push(n.to_string());
        }

        if profile.skip_unavailable_fragments {
            args.push("--skip-unavailable-fragments".to_string());
        }

        if !profile.format_sort.is_empty() {
            args.push("--format-sort".to_string());
            args.push(profile.format_sort.join(","));
        }

        args.push("--user-agent".to_string());
        args.push(USER_AGENT.to_string());
        args.push("--add-headers".to_string());
        args.push(format!("Accept-Language:{}", ACCEPT_LANGUAGE));

        if let Some(referer) = profile.referer {
            args.push("--referer".to_string());
            args.push(referer.to_string());
        }

        args
    }

    fn probe_args(url: &str, profile: &SiteProfile) -> Vec<String> {
        let mut args = vec!["--dump-json".to_string()];
        args.extend(Self::profile_args(profile, profile.socket_timeout_secs));
        args.push(url.to_string());
        args
    }

    fn fetch_args(
        url: &str,
        profile: &SiteProfile,
        format_spec: &str,
        output_dir: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            format_spec.to_string(),
            "--newline".to_string(),
            "-P".to_string(),
            output_dir.to_string_lossy().to_string(),
            "-o".to_string(),
            OUTPUT_TEMPLATE.to_string(),
        ];
        args.extend(Self::profile_args(profile, DOWNLOAD_SOCKET_TIMEOUT_SECS));
        args.push(url.to_string());
        args
    }

    fn parse_metadata(stdout: &[u8]) -> Result<MediaMetadata, DownloadError> {
        let json_str = String::from_utf8_lossy(stdout);
        let json: serde_json::Value = serde_json::from_str(&json_str)
            .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))?;

        let formats = json["formats"]
            .as_array()
            .map(|arr| arr.iter().map(Self::parse_format).collect())
            .unwrap_or_default();

        Ok(MediaMetadata {
            id: json["id"].as_str().unwrap_or("").to_string(),
            title: json["title"].as_str().unwrap_or("Unknown").to_string(),
            duration_seconds: json["duration"].as_f64().unwrap_or(0.0) as u64,
            thumbnail: json["thumbnail"].as_str().unwrap_or("").to_string(),
            uploader: json["uploader"].as_str().unwrap_or("Unknown").to_string(),
            webpage_url: json["webpage_url"].as_str().unwrap_or("").to_string(),
            formats,
        })
    }

    fn parse_format(f: &serde_json::Value) -> StreamFormat {
        StreamFormat {
            format_id: f["format_id"].as_str().unwrap_or("").to_string(),
            ext: f["ext"].as_str().unwrap_or("").to_string(),
            resolution: f["resolution"].as_str().map(|s| s.to_string()),
            vcodec: f["vcodec"].as_str().map(|s| s.to_string()),
            acodec: f["acodec"].as_str().map(|s| s.to_string()),
            filesize: f["filesize"].as_u64(),
            fps: f["fps"].as_f64(),
            format: f["format"].as_str().map(|s| s.to_string()),
        }
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionEngine for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(
        &self,
        url: &str,
        profile: &SiteProfile,
    ) -> Result<MediaMetadata, DownloadError> {
        let args = Self::probe_args(url, profile);
        debug!(engine = self.name(), profile = profile.name, %url, "probing metadata");

        // Twice the socket timeout: extraction spans several requests
        let output =
            run_output_with_timeout(&self.binary, args, profile.socket_timeout_secs * 2)
                .await
                .map_err(DownloadError::ExecutionError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(DownloadError::from(stderr));
        }

        Self::parse_metadata(&output.stdout)
    }

    async fn fetch(
        &self,
        url: &str,
        profile: &SiteProfile,
        format_spec: &str,
        output_dir: &Path,
    ) -> Result<FetchOutcome, DownloadError> {
        let args = Self::fetch_args(url, profile, format_spec, output_dir);
        debug!(engine = self.name(), profile = profile.name, format_spec, %url, "starting download");

        let mut child = TokioCommand::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                DownloadError::ExecutionError(format!("Failed to start {}: {}", self.binary, e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stdout".to_string()))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr_pipe.read_to_string(&mut buf).await;
            buf
        });

        // No overall deadline here: the per-profile socket timeout is the
        // only bound on hang time, and downloads legitimately run for
        // tens of seconds.
        let mut scanner = OutputScanner::default();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| DownloadError::ExecutionError(format!("Failed to read stdout: {}", e)))?
        {
            scanner.observe(&line);
            if line.contains("[download]") || line.contains("[Merger]") {
                debug!(engine = self.name(), "{}", line);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::ExecutionError(format!("Process error: {}", e)))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            warn!(engine = self.name(), "download exited with {}", status);
            return Err(DownloadError::from(stderr_output));
        }

        Ok(FetchOutcome {
            produced_path: scanner.into_path(),
        })
    }
}
