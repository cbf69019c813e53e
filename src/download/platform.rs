//! Supported media platforms and link detection.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

pub const INSTAGRAM_DOMAINS: &[&str] = &["instagram.com", "instagr.am"];
pub const TIKTOK_DOMAINS: &[&str] = &["tiktok.com", "tiktokcdn.com", "vm.tiktok.com", "vt.tiktok.com"];
pub const SNAPCHAT_DOMAINS: &[&str] = &["snapchat.com", "story.snapchat.com"];
pub const LIKEE_DOMAINS: &[&str] = &["likee.video", "l.likee.video", "like.video"];
pub const YOUTUBE_DOMAINS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
];

/// Every domain the bot reacts to.
pub fn supported_domains() -> impl Iterator<Item = &'static str> {
    [
        INSTAGRAM_DOMAINS,
        TIKTOK_DOMAINS,
        SNAPCHAT_DOMAINS,
        LIKEE_DOMAINS,
        YOUTUBE_DOMAINS,
    ]
    .into_iter()
    .flatten()
    .copied()
}

static SUPPORTED_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    let domains = supported_domains()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)https?://\S*({domains})\S*"))
        .unwrap_or_else(|e| unreachable!("invalid supported URL pattern: {e}"))
});

/// Platform a link belongs to, decided by its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Instagram,
    TikTok,
    Snapchat,
    Likee,
    YouTube,
    Other,
}

impl Platform {
    /// Detects the platform from the URL host. Unparseable URLs are [`Platform::Other`].
    #[must_use]
    pub fn detect(url: &str) -> Self {
        let Some(host) = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
        else {
            return Self::Other;
        };
        let matches = |domains: &[&str]| domains.iter().any(|d| host.contains(d));

        if matches(INSTAGRAM_DOMAINS) {
            Self::Instagram
        } else if matches(TIKTOK_DOMAINS) {
            Self::TikTok
        } else if matches(SNAPCHAT_DOMAINS) {
            Self::Snapchat
        } else if matches(LIKEE_DOMAINS) {
            Self::Likee
        } else if matches(YOUTUBE_DOMAINS) {
            Self::YouTube
        } else {
            Self::Other
        }
    }

    /// Referer header presented to the platform's servers.
    #[must_use]
    pub const fn referer(self) -> &'static str {
        match self {
            Self::Instagram => "https://www.instagram.com/",
            Self::YouTube => "https://www.youtube.com/",
            Self::Snapchat => "https://story.snapchat.com/",
            Self::Likee => "https://www.likee.video/",
            Self::TikTok | Self::Other => "https://www.tiktok.com/",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Instagram => "Instagram",
            Self::TikTok => "TikTok",
            Self::Snapchat => "Snapchat",
            Self::Likee => "Likee",
            Self::YouTube => "YouTube",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Returns whether any supported domain appears in the link.
#[must_use]
pub fn is_supported_url(url: &str) -> bool {
    let lowered = url.to_lowercase();
    supported_domains().any(|d| lowered.contains(d))
}

/// Finds the first supported link in a message text or caption.
#[must_use]
pub fn extract_supported_url(text: &str) -> Option<&str> {
    SUPPORTED_URL_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|candidate| is_supported_url(candidate))
}
