// Download orchestration with format fallback and artifact checks

use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::Config;

use super::errors::DownloadError;
use super::models::{Artifact, DownloadRequest, FormatSpec, MediaMetadata, StreamFormat};
use super::profiles::profile_for;
use super::reconciler::resolve_format;
use super::traits::{ExtractionEngine, Remuxer};
use super::utils::{is_allowed_domain, sanitize_filename};

/// Container assumed when the target-extension probe fails or the format id
/// is not in the reported list.
const DEFAULT_CONTAINER: &str = "mp4";

/// Storyboard and image pseudo-formats, dropped from metadata responses.
const IMAGE_EXTS: &[&str] = &["mhtml", "jpg", "jpeg", "png", "gif", "webp"];

pub struct Downloader {
    config: Config,
    engine: Box<dyn ExtractionEngine>,
    remuxer: Box<dyn Remuxer>,
}

impl Downloader {
    pub fn new(
        config: Config,
        engine: Box<dyn ExtractionEngine>,
        remuxer: Box<dyn Remuxer>,
    ) -> Self {
        Self {
            config,
            engine,
            remuxer,
        }
    }

    /// Fetch stream metadata for a URL.
    ///
    /// If every reported format is filtered out by the projection, the probe
    /// is retried once with strict fragment handling and a relaxed
    /// projection before giving up.
    pub async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, DownloadError> {
        if !is_allowed_domain(url, &self.config.allowed_domains) {
            warn!(%url, "domain not allowed");
            return Err(DownloadError::InvalidDomain);
        }

        let profile = profile_for(url);
        info!(%url, profile = profile.name, "fetching info");

        let mut metadata = self.engine.probe(url, &profile).await?;
        let usable = project_formats(&metadata.formats);

        if usable.is_empty() {
            warn!(%url, "no formats found, retrying with strict fragment handling");
            let mut retry_profile = profile.clone();
            retry_profile.skip_unavailable_fragments = false;
            let retried = self.engine.probe(url, &retry_profile).await?;
            let relaxed = project_formats_relaxed(&retried.formats);
            metadata = retried;
            metadata.formats = relaxed;
        } else {
            metadata.formats = usable;
        }

        info!(%url, formats = metadata.formats.len(), "info fetched");
        Ok(metadata)
    }

    /// Run the full download sequence and return the finished artifact.
    pub async fn download(&self, request: &DownloadRequest) -> Result<Artifact, DownloadError> {
        if !is_allowed_domain(&request.url, &self.config.allowed_domains) {
            warn!(url = %request.url, "domain not allowed for download");
            return Err(DownloadError::InvalidDomain);
        }

        let profile = profile_for(&request.url);
        info!(
            url = %request.url,
            format_id = %request.format_id,
            quality = ?request.quality,
            "starting download"
        );

        let resolved =
            resolve_format(self.engine.as_ref(), &request.url, &profile, &request.format_id)
                .await;
        let needs_merge = resolved.is_merge();
        let target_ext = self
            .target_extension(&request.url, &profile, &request.format_id)
            .await;

        let outcome = match self
            .engine
            .fetch(
                &request.url,
                &profile,
                resolved.as_str(),
                &self.config.download_dir,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    %err,
                    spec = resolved.as_str(),
                    "format failed, retrying with best available format"
                );
                self.engine
                    .fetch(
                        &request.url,
                        &profile,
                        FormatSpec::best().as_str(),
                        &self.config.download_dir,
                    )
                    .await?
            }
        };

        // The engine's own filename resolution is the only source of truth
        // for where the file landed.
        let mut path = match outcome.produced_path {
            Some(path) => path,
            None => {
                error!("engine did not report an output file");
                return Err(DownloadError::FileMissing(
                    "File was not created during download".to_string(),
                ));
            }
        };
        if tokio::fs::metadata(&path).await.is_err() {
            error!(path = %path.display(), "downloaded file not found");
            return Err(DownloadError::FileMissing(
                "File was not created during download".to_string(),
            ));
        }

        // Merged output may land in a container that differs from the
        // requested format's natural one; repackage without re-encoding.
        // Best-effort: on failure the original file is kept.
        if needs_merge && !has_extension(&path, &target_ext) {
            info!(target_ext, "converting merged output");
            let target = path.with_extension(&target_ext);
            match self.remuxer.remux(&path, &target).await {
                Ok(()) => {
                    let _ = tokio::fs::remove_file(&path).await;
                    debug!(file = %target.display(), "conversion successful");
                    path = target;
                }
                Err(err) => {
                    warn!(%err, "conversion failed, keeping original");
                }
            }
        }

        let current_name = file_name_of(&path);
        let final_name = sanitize_filename(
            &current_name,
            self.config.max_filename_length,
            request.quality.as_deref(),
        );
        if final_name != current_name {
            let renamed = path.with_file_name(&final_name);
            match tokio::fs::rename(&path, &renamed).await {
                Ok(()) => {
                    debug!(file = %renamed.display(), "renamed for delivery");
                    path = renamed;
                }
                Err(err) => {
                    // Keep the previous name; the artifact itself is intact
                    warn!(%err, "failed to rename, keeping original filename");
                }
            }
        }

        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                error!(path = %path.display(), "final file not found");
                let _ = tokio::fs::remove_file(&path).await;
                return Err(DownloadError::FileMissing(
                    "File was not found after processing".to_string(),
                ));
            }
        };

        let limit = self.config.max_video_size_bytes();
        if size > limit {
            warn!(size, limit, "file size exceeds limit, deleting");
            let _ = tokio::fs::remove_file(&path).await;
            return Err(DownloadError::FileTooLarge { size, limit });
        }

        let artifact = Artifact {
            file_name: file_name_of(&path),
            path,
            size_bytes: size,
        };
        info!(file = %artifact.file_name, size, "download completed");
        Ok(artifact)
    }

    /// Best-effort probe for the requested format's natural container.
    /// Failures are absorbed and the default container is assumed.
    async fn target_extension(
        &self,
        url: &str,
        profile: &super::profiles::SiteProfile,
        format_id: &str,
    ) -> String {
        match self.engine.probe(url, profile).await {
            Ok(metadata) => metadata
                .formats
                .iter()
                .find(|f| f.format_id == format_id)
                .map(|f| f.ext.clone())
                .filter(|ext| !ext.is_empty())
                .unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
            Err(err) => {
                debug!(%err, "target container probe failed, assuming default");
                DEFAULT_CONTAINER.to_string()
            }
        }
    }
}

fn project_formats(formats: &[StreamFormat]) -> Vec<StreamFormat> {
    formats
        .iter()
        .filter(|f| {
            !f.ext.is_empty()
                && !IMAGE_EXTS.contains(&f.ext.as_str())
                && !(f.vcodec_or_none() == "none" && f.acodec_or_none() == "none")
        })
        .cloned()
        .collect()
}

fn project_formats_relaxed(formats: &[StreamFormat]) -> Vec<StreamFormat> {
    formats
        .iter()
        .filter(|f| !f.ext.is_empty() && !IMAGE_EXTS.contains(&f.ext.as_str()))
        .cloned()
        .collect()
}

fn has_extension(path: &Path, ext: &str) -> bool {
    file_name_of(path)
        .to_lowercase()
        .ends_with(&format!(".{}", ext.to_lowercase()))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::profiles::SiteProfile;
    use crate::downloader::traits::FetchOutcome;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    enum FetchScript {
        Fail(DownloadError),
        /// Create a file with the given name and size, report its path
        Produce { file_name: &'static str, bytes: usize },
        /// Report a path without creating the file
        ReportOnly { file_name: &'static str },
        /// Succeed without reporting any path
        NoPath,
    }

    /// Shared with the test body so calls can be inspected after the
    /// downloader has taken ownership of the engine box.
    #[derive(Default)]
    struct EngineState {
        probe_calls: AtomicUsize,
        probe_profiles: Mutex<Vec<SiteProfile>>,
        fetch_script: Mutex<VecDeque<FetchScript>>,
        fetch_specs: Mutex<Vec<String>>,
    }

    struct MockEngine {
        /// Queue of probe responses; the last entry is reused once drained
        probe_queue: Mutex<VecDeque<MediaMetadata>>,
        state: Arc<EngineState>,
    }

    impl MockEngine {
        fn new(probes: Vec<MediaMetadata>, script: Vec<FetchScript>) -> (Box<Self>, Arc<EngineState>) {
            let state = Arc::new(EngineState {
                fetch_script: Mutex::new(script.into()),
                ..EngineState::default()
            });
            let engine = Box::new(Self {
                probe_queue: Mutex::new(probes.into()),
                state: Arc::clone(&state),
            });
            (engine, state)
        }
    }

    #[async_trait]
    impl ExtractionEngine for MockEngine {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn probe(
            &self,
            _url: &str,
            profile: &SiteProfile,
        ) -> Result<MediaMetadata, DownloadError> {
            self.state.probe_calls.fetch_add(1, Ordering::SeqCst);
            self.state
                .probe_profiles
                .lock()
                .unwrap()
                .push(profile.clone());
            let mut queue = self.probe_queue.lock().unwrap();
            if queue.len() > 1 {
                Ok(queue.pop_front().unwrap())
            } else {
                queue
                    .front()
                    .cloned()
                    .ok_or_else(|| DownloadError::Unknown("no probe response".to_string()))
            }
        }

        async fn fetch(
            &self,
            _url: &str,
            _profile: &SiteProfile,
            format_spec: &str,
            output_dir: &Path,
        ) -> Result<FetchOutcome, DownloadError> {
            self.state
                .fetch_specs
                .lock()
                .unwrap()
                .push(format_spec.to_string());
            match self.state.fetch_script.lock().unwrap().pop_front() {
                Some(FetchScript::Fail(err)) => Err(err),
                Some(FetchScript::Produce { file_name, bytes }) => {
                    let path = output_dir.join(file_name);
                    std::fs::write(&path, vec![0u8; bytes]).unwrap();
                    Ok(FetchOutcome {
                        produced_path: Some(path),
                    })
                }
                Some(FetchScript::ReportOnly { file_name }) => Ok(FetchOutcome {
                    produced_path: Some(output_dir.join(file_name)),
                }),
                Some(FetchScript::NoPath) => Ok(FetchOutcome::default()),
                None => panic!("unexpected fetch call"),
            }
        }
    }

    #[derive(Default)]
    struct RemuxState {
        calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    struct MockRemuxer {
        fail: bool,
        state: Arc<RemuxState>,
    }

    impl MockRemuxer {
        fn new(fail: bool) -> (Box<Self>, Arc<RemuxState>) {
            let state = Arc::new(RemuxState::default());
            let remuxer = Box::new(Self {
                fail,
                state: Arc::clone(&state),
            });
            (remuxer, state)
        }
    }

    #[async_trait]
    impl Remuxer for MockRemuxer {
        async fn remux(&self, input: &Path, output: &Path) -> Result<(), DownloadError> {
            self.state
                .calls
                .lock()
                .unwrap()
                .push((input.to_path_buf(), output.to_path_buf()));
            if self.fail {
                return Err(DownloadError::ExecutionError(
                    "ffmpeg exited with 1".to_string(),
                ));
            }
            std::fs::copy(input, output).unwrap();
            Ok(())
        }
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            download_dir: dir.to_path_buf(),
            max_video_size_mb: 300,
            allowed_domains: vec!["youtube.com".to_string(), "facebook.com".to_string()],
            max_filename_length: 200,
            max_request_size_mb: 500,
        }
    }

    fn stream(format_id: &str, ext: &str, vcodec: &str, acodec: &str) -> StreamFormat {
        StreamFormat {
            format_id: format_id.to_string(),
            ext: ext.to_string(),
            resolution: Some("1920x1080".to_string()),
            vcodec: Some(vcodec.to_string()),
            acodec: Some(acodec.to_string()),
            filesize: Some(1000),
            fps: Some(30.0),
            format: None,
        }
    }

    fn metadata(formats: Vec<StreamFormat>) -> MediaMetadata {
        MediaMetadata {
            id: "abc".to_string(),
            title: "Title".to_string(),
            duration_seconds: 30,
            thumbnail: String::new(),
            uploader: "someone".to_string(),
            webpage_url: URL.to_string(),
            formats,
        }
    }

    fn request(format_id: &str, quality: Option<&str>) -> DownloadRequest {
        DownloadRequest {
            url: URL.to_string(),
            format_id: format_id.to_string(),
            quality: quality.map(|q| q.to_string()),
        }
    }

    const URL: &str = "https://www.youtube.com/watch?v=abc";

    fn build(
        config: Config,
        probes: Vec<MediaMetadata>,
        script: Vec<FetchScript>,
        remux_fail: bool,
    ) -> (Downloader, Arc<EngineState>, Arc<RemuxState>) {
        let (engine, engine_state) = MockEngine::new(probes, script);
        let (remuxer, remux_state) = MockRemuxer::new(remux_fail);
        (
            Downloader::new(config, engine, remuxer),
            engine_state,
            remux_state,
        )
    }

    #[tokio::test]
    async fn rejects_unlisted_domain_before_any_engine_call() {
        let dir = tempfile::tempdir().unwrap();
        let (dl, engine, _) = build(test_config(dir.path()), vec![metadata(vec![])], vec![], false);

        let mut req = request("137", None);
        req.url = "https://example.com/video".to_string();
        let err = dl.download(&req).await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidDomain));

        assert_eq!(engine.probe_calls.load(Ordering::SeqCst), 0);
        assert!(engine.fetch_specs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn self_contained_format_downloads_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let meta = metadata(vec![stream("22", "mp4", "avc1.64001F", "mp4a.40.2")]);
        let (dl, engine, remux) = build(
            test_config(dir.path()),
            vec![meta],
            vec![FetchScript::Produce {
                file_name: "Title.mp4",
                bytes: 2048,
            }],
            false,
        );

        let artifact = dl.download(&request("22", None)).await.unwrap();
        assert_eq!(artifact.file_name, "Title.mp4");
        assert_eq!(artifact.size_bytes, 2048);
        assert!(artifact.path.exists());

        assert_eq!(
            engine.fetch_specs.lock().unwrap().as_slice(),
            &["22".to_string()]
        );
        assert!(remux.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn merged_output_is_remuxed_on_container_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let meta = metadata(vec![stream("137", "mp4", "avc1.640028", "none")]);
        let (dl, engine, remux) = build(
            test_config(dir.path()),
            vec![meta],
            vec![FetchScript::Produce {
                file_name: "Title.webm",
                bytes: 4096,
            }],
            false,
        );

        let artifact = dl.download(&request("137", None)).await.unwrap();
        assert_eq!(artifact.file_name, "Title.mp4");
        assert!(artifact.path.exists());
        assert!(!dir.path().join("Title.webm").exists());

        assert_eq!(
            engine.fetch_specs.lock().unwrap().as_slice(),
            &["137+bestaudio/best".to_string()]
        );
        let calls = remux.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, dir.path().join("Title.webm"));
        assert_eq!(calls[0].1, dir.path().join("Title.mp4"));
    }

    #[tokio::test]
    async fn matching_container_skips_remux() {
        let dir = tempfile::tempdir().unwrap();
        let meta = metadata(vec![stream("137", "mp4", "avc1.640028", "none")]);
        let (dl, _, remux) = build(
            test_config(dir.path()),
            vec![meta],
            vec![FetchScript::Produce {
                file_name: "Title.mp4",
                bytes: 4096,
            }],
            false,
        );

        let artifact = dl.download(&request("137", None)).await.unwrap();
        assert_eq!(artifact.file_name, "Title.mp4");
        assert!(remux.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remux_failure_keeps_original_file() {
        let dir = tempfile::tempdir().unwrap();
        let meta = metadata(vec![stream("137", "mp4", "avc1.640028", "none")]);
        let (dl, _, remux) = build(
            test_config(dir.path()),
            vec![meta],
            vec![FetchScript::Produce {
                file_name: "Title.webm",
                bytes: 4096,
            }],
            true,
        );

        let artifact = dl.download(&request("137", None)).await.unwrap();
        assert_eq!(artifact.file_name, "Title.webm");
        assert!(dir.path().join("Title.webm").exists());
        assert_eq!(remux.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retries_with_best_after_format_failure() {
        let dir = tempfile::tempdir().unwrap();
        let meta = metadata(vec![stream("137", "mp4", "avc1.640028", "none")]);
        let (dl, engine, _) = build(
            test_config(dir.path()),
            vec![meta],
            vec![
                FetchScript::Fail(DownloadError::FormatUnavailable(
                    "Requested format is not available".to_string(),
                )),
                FetchScript::Produce {
                    file_name: "Title.mp4",
                    bytes: 1024,
                },
            ],
            false,
        );

        let artifact = dl.download(&request("137", None)).await.unwrap();
        assert_eq!(artifact.file_name, "Title.mp4");
        assert_eq!(
            engine.fetch_specs.lock().unwrap().as_slice(),
            &["137+bestaudio/best".to_string(), "best".to_string()]
        );
    }

    #[tokio::test]
    async fn second_failure_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let meta = metadata(vec![stream("137", "mp4", "avc1.640028", "none")]);
        let (dl, engine, _) = build(
            test_config(dir.path()),
            vec![meta],
            vec![
                FetchScript::Fail(DownloadError::FormatUnavailable("rejected".to_string())),
                FetchScript::Fail(DownloadError::NetworkTimeout),
            ],
            false,
        );

        let err = dl.download(&request("137", None)).await.unwrap_err();
        assert!(matches!(err, DownloadError::NetworkTimeout));
        assert_eq!(engine.fetch_specs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn silently_missing_file_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let meta = metadata(vec![stream("22", "mp4", "avc1.64001F", "mp4a.40.2")]);
        let (dl, _, _) = build(
            test_config(dir.path()),
            vec![meta],
            vec![FetchScript::ReportOnly {
                file_name: "Ghost.mp4",
            }],
            false,
        );

        let err = dl.download(&request("22", None)).await.unwrap_err();
        assert!(matches!(err, DownloadError::FileMissing(_)));
    }

    #[tokio::test]
    async fn unreported_output_path_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let meta = metadata(vec![stream("22", "mp4", "avc1.64001F", "mp4a.40.2")]);
        let (dl, _, _) = build(
            test_config(dir.path()),
            vec![meta],
            vec![FetchScript::NoPath],
            false,
        );

        let err = dl.download(&request("22", None)).await.unwrap_err();
        assert!(matches!(err, DownloadError::FileMissing(_)));
    }

    #[tokio::test]
    async fn oversized_artifact_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let meta = metadata(vec![stream("22", "mp4", "avc1.64001F", "mp4a.40.2")]);
        let mut config = test_config(dir.path());
        config.max_video_size_mb = 1;
        let (dl, _, _) = build(
            config,
            vec![meta],
            vec![FetchScript::Produce {
                file_name: "Title.mp4",
                bytes: 2 * 1024 * 1024,
            }],
            false,
        );

        let err = dl.download(&request("22", None)).await.unwrap_err();
        assert!(matches!(err, DownloadError::FileTooLarge { .. }));
        // No artifact survives the size violation
        assert!(!dir.path().join("Title.mp4").exists());
    }

    #[tokio::test]
    async fn quality_label_is_applied_within_bound() {
        let dir = tempfile::tempdir().unwrap();
        let meta = metadata(vec![stream("22", "mp4", "avc1.64001F", "mp4a.40.2")]);
        let mut config = test_config(dir.path());
        config.max_filename_length = 20;
        let (dl, _, _) = build(
            config,
            vec![meta],
            vec![FetchScript::Produce {
                file_name: "A Very Long Title That Exceeds The Limit.mp4",
                bytes: 512,
            }],
            false,
        );

        let artifact = dl.download(&request("22", Some("720p"))).await.unwrap();
        assert_eq!(artifact.file_name, "A Very Long_720p.mp4");
        assert!(artifact.file_name.chars().count() <= 20);
        assert!(dir.path().join("A Very Long_720p.mp4").exists());
        assert!(!dir
            .path()
            .join("A Very Long Title That Exceeds The Limit.mp4")
            .exists());
    }

    #[tokio::test]
    async fn metadata_projection_drops_image_formats() {
        let dir = tempfile::tempdir().unwrap();
        let formats = vec![
            stream("sb0", "mhtml", "none", "none"),
            stream("thumb", "jpg", "none", "none"),
            stream("22", "mp4", "avc1.64001F", "mp4a.40.2"),
            stream("opaque", "mp4", "none", "none"),
        ];
        let (dl, engine, _) = build(
            test_config(dir.path()),
            vec![metadata(formats)],
            vec![],
            false,
        );

        let meta = dl.fetch_metadata(URL).await.unwrap();
        assert_eq!(meta.formats.len(), 1);
        assert_eq!(meta.formats[0].format_id, "22");
        assert_eq!(engine.probe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn metadata_retries_probe_when_nothing_projects() {
        let dir = tempfile::tempdir().unwrap();
        // First probe reports only storyboards; the retry reports a format
        // the relaxed projection keeps despite its opaque codecs.
        let first = metadata(vec![stream("sb0", "mhtml", "none", "none")]);
        let second = metadata(vec![stream("0", "mp4", "none", "none")]);
        let (dl, engine, _) = build(
            test_config(dir.path()),
            vec![first, second],
            vec![],
            false,
        );

        // Facebook profile normally tolerates unavailable fragments; the
        // retry must turn that off.
        let meta = dl
            .fetch_metadata("https://www.facebook.com/watch?v=abc")
            .await
            .unwrap();
        assert_eq!(meta.formats.len(), 1);
        assert_eq!(meta.formats[0].format_id, "0");

        assert_eq!(engine.probe_calls.load(Ordering::SeqCst), 2);
        let profiles = engine.probe_profiles.lock().unwrap();
        assert!(profiles[0].skip_unavailable_fragments);
        assert!(!profiles[1].skip_unavailable_fragments);
    }

    #[tokio::test]
    async fn metadata_rejects_unlisted_domain() {
        let dir = tempfile::tempdir().unwrap();
        let (dl, engine, _) = build(test_config(dir.path()), vec![metadata(vec![])], vec![], false);

        let err = dl
            .fetch_metadata("https://example.com/clip")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidDomain));
        assert_eq!(engine.probe_calls.load(Ordering::SeqCst), 0);
    }
}

