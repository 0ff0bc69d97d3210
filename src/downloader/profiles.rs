// Per-site request profiles for the extraction engine

/// Browser user agent sent with every engine request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Request configuration tuned for the originating site.
///
/// Selected from the URL on every call; never cached, so each probe and
/// fetch within one request re-derives it independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    pub name: &'static str,
    pub referer: Option<&'static str>,
    /// Suppress engine warnings and progress noise
    pub quiet: bool,
    pub socket_timeout_secs: u64,
    pub retries: u32,
    pub fragment_retries: Option<u32>,
    /// Tolerate unavailable fragments (skip and continue) instead of
    /// aborting the whole extraction
    pub skip_unavailable_fragments: bool,
    /// Ranking hints applied when the engine picks a "best" format
    pub format_sort: &'static [&'static str],
}

impl SiteProfile {
    fn default_profile() -> Self {
        Self {
            name: "default",
            referer: None,
            quiet: false,
            socket_timeout_secs: 30,
            retries: 0,
            fragment_retries: None,
            skip_unavailable_fragments: false,
            format_sort: &[],
        }
    }

    fn facebook() -> Self {
        Self {
            name: "facebook",
            referer: Some("https://www.facebook.com/"),
            quiet: true,
            fragment_retries: Some(3),
            skip_unavailable_fragments: true,
            format_sort: &["res", "fps", "codec:h264", "lang"],
            ..Self::default_profile()
        }
    }

    fn tiktok() -> Self {
        Self {
            name: "tiktok",
            referer: Some("https://www.tiktok.com/"),
            socket_timeout_secs: 60,
            retries: 3,
            skip_unavailable_fragments: true,
            format_sort: &["res", "fps"],
            ..Self::default_profile()
        }
    }

    fn instagram() -> Self {
        Self {
            name: "instagram",
            referer: Some("https://www.instagram.com/"),
            socket_timeout_secs: 60,
            retries: 3,
            skip_unavailable_fragments: true,
            format_sort: &["res", "fps"],
            ..Self::default_profile()
        }
    }

    fn twitter() -> Self {
        Self {
            name: "twitter",
            referer: Some("https://twitter.com/"),
            socket_timeout_secs: 60,
            retries: 3,
            skip_unavailable_fragments: true,
            format_sort: &["res", "fps"],
            ..Self::default_profile()
        }
    }
}

fn matches_any(url: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| url.contains(n))
}

/// Map a URL to its request profile.
///
/// Fixed-priority substring chain, default profile last. Pure function of
/// the URL string; no host parsing, same looseness as the allow-list.
pub fn profile_for(url: &str) -> SiteProfile {
    if matches_any(url, &["facebook.com", "fb.watch", "m.facebook.com"]) {
        SiteProfile::facebook()
    } else if matches_any(url, &["tiktok.com", "vt.tiktok.com", "m.tiktok.com"]) {
        SiteProfile::tiktok()
    } else if url.contains("instagram.com") {
        SiteProfile::instagram()
    } else if matches_any(url, &["twitter.com", "x.com"]) {
        SiteProfile::twitter()
    } else {
        SiteProfile::default_profile()
    }
}
