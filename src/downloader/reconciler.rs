// Format reconciliation - decides whether a requested format needs audio

use tracing::{info, warn};

use super::models::FormatSpec;
use super::profiles::SiteProfile;
use super::traits::ExtractionEngine;

/// Reconcile a user-requested format id against the site's reported
/// capabilities.
///
/// Video-only formats are paired with the best available audio stream;
/// self-contained and audio-only formats pass through unchanged. An id the
/// site does not report gets the audio pairing anyway, on the assumption
/// that an unresolvable format most likely needs one. A failed probe is
/// absorbed: resolution proceeds optimistically with the requested id and
/// the actual download surfaces any real failure.
pub async fn resolve_format(
    engine: &dyn ExtractionEngine,
    url: &str,
    profile: &SiteProfile,
    requested_id: &str,
) -> FormatSpec {
    let metadata = match engine.probe(url, profile).await {
        Ok(meta) => meta,
        Err(err) => {
            warn!(%err, requested_id, "format probe failed, using requested format as-is");
            return FormatSpec::single(requested_id);
        }
    };

    match metadata
        .formats
        .iter()
        .find(|f| f.format_id == requested_id)
    {
        Some(f) if f.is_video_only() => {
            info!(requested_id, "format has no audio, merging with best audio");
            FormatSpec::merged_with_audio(requested_id)
        }
        Some(f) if f.has_audio() => {
            info!(requested_id, "format has audio, using as-is");
            FormatSpec::single(requested_id)
        }
        Some(_) => {
            // Audio-only or opaque codecs; no merge attempted
            info!(requested_id, "format is audio-only or unknown, using as-is");
            FormatSpec::single(requested_id)
        }
        None => {
            warn!(requested_id, "format not in reported list, attempting merge with audio");
            FormatSpec::merged_with_audio(requested_id)
        }
    }
}
