//! TikTok videos without watermark, resolved through ssstik.io.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT};
use scraper::{Html, Selector};
use tracing::{error, info, warn};

use super::http::{cleanup_file, download_to_file};
use super::{DownloadError, DownloadResult, MediaKind};

const SSSTIK_BASE: &str = "https://ssstik.io";
const SSSTIK_ENDPOINT: &str = "https://ssstik.io/abc?url=dl";

/// Anything smaller is an error page, not a video.
pub const MIN_VIDEO_BYTES: u64 = 120 * 1024;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"id="tt"\s+value="([^"]+)""#)
        .unwrap_or_else(|e| unreachable!("invalid token pattern: {e}"))
});

static ANY_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^"\s<>]+"#).unwrap_or_else(|e| unreachable!("invalid link pattern: {e}"))
});

/// Form token embedded in the ssstik landing page. Empty when absent.
#[must_use]
pub fn extract_token(landing_html: &str) -> String {
    TOKEN_RE
        .captures(landing_html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
        .unwrap_or_default()
}

/// Extracts the HTML fragment from an ssstik answer.
///
/// The service answers either with a JSON envelope (`status` plus `data` or
/// `result`) or with the bare fragment.
pub fn response_fragment(body: &str) -> Result<String, DownloadError> {
    let fragment = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(envelope)) => {
            let status = envelope
                .get("status")
                .map(|s| s.as_str().map_or_else(|| s.to_string(), str::to_owned))
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty());
            if let Some(status) = status
                && status != "ok"
                && status != "success"
            {
                warn!("ssstik returned status {}", status);
                return Err(DownloadError::TikTokService);
            }
            envelope
                .get("data")
                .or_else(|| envelope.get("result"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_owned()
        }
        Ok(_) => String::new(),
        Err(_) => body.to_owned(),
    };

    if fragment.trim().is_empty() {
        return Err(DownloadError::TikTokService);
    }
    Ok(fragment)
}

/// Makes protocol-relative and root-relative links absolute.
#[must_use]
pub fn normalize_remote_url(raw: &str, base: &str) -> String {
    let cleaned = raw.trim();
    if let Some(rest) = cleaned.strip_prefix("//") {
        format!("https://{rest}")
    } else if cleaned.starts_with('/') {
        format!("{}{cleaned}", base.trim_end_matches('/'))
    } else {
        cleaned.to_owned()
    }
}

/// The no-watermark link, falling back to the first absolute link in the fragment.
#[must_use]
pub fn extract_video_url(fragment: &str) -> Option<String> {
    let document = Html::parse_fragment(fragment);
    let from_button = Selector::parse(r#"a[class*="without_watermark"]"#)
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .find_map(|a| a.value().attr("href"))
                .map(str::to_owned)
        })
        .filter(|href| !href.trim().is_empty());

    from_button
        .or_else(|| ANY_LINK_RE.find(fragment).map(|m| m.as_str().replace("&amp;", "&")))
        .map(|raw| normalize_remote_url(&raw, SSSTIK_BASE))
}

/// Video title shown by ssstik, if any.
#[must_use]
pub fn extract_title(fragment: &str) -> Option<String> {
    let document = Html::parse_fragment(fragment);
    let selector = Selector::parse(r#"[class*="download-title"]"#).ok()?;
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_owned())
        .find(|title| !title.is_empty())
}

/// Downloads TikTok videos through ssstik.io.
#[derive(Debug, Clone)]
pub struct TikTokDownloader {
    client: Client,
    download_dir: PathBuf,
    user_agent: String,
}

impl TikTokDownloader {
    #[must_use]
    pub fn new(client: Client, download_dir: PathBuf, user_agent: String) -> Self {
        Self {
            client,
            download_dir,
            user_agent,
        }
    }

    fn user_agent(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers
    }

    pub async fn download(&self, url: &str) -> Result<DownloadResult, DownloadError> {
        let result = self.download_via_ssstik(url).await;
        match &result {
            Ok(_) => info!("TikTok video fetched through ssstik"),
            Err(e) => error!("TikTok download through ssstik failed: {}", e),
        }
        result
    }

    async fn download_via_ssstik(&self, url: &str) -> Result<DownloadResult, DownloadError> {
        let landing = self
            .client
            .get(format!("{SSSTIK_BASE}/"))
            .headers(self.user_agent())
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                warn!("ssstik landing page failed: {}", e);
                DownloadError::TikTokService
            })?
            .text()
            .await
            .map_err(|_| DownloadError::TikTokService)?;

        let token = extract_token(&landing);

        let mut headers = self.user_agent();
        headers.insert(REFERER, HeaderValue::from_static("https://ssstik.io/"));
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("id", url)
            .append_pair("locale", "en")
            .append_pair("tt", &token)
            .finish();

        let answer = self
            .client
            .post(SSSTIK_ENDPOINT)
            .headers(headers)
            .body(body)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                warn!("ssstik API request failed: {}", e);
                DownloadError::TikTokService
            })?
            .text()
            .await
            .map_err(|_| DownloadError::TikTokService)?;

        let fragment = response_fragment(&answer)?;
        let video_url = extract_video_url(&fragment).ok_or(DownloadError::TikTokNoLink)?;
        let title = extract_title(&fragment).unwrap_or_else(|| "TikTok video".to_owned());

        let destination = self
            .download_dir
            .join(format!("{}.mp4", uuid::Uuid::new_v4().simple()));

        let mut headers = self.user_agent();
        headers.insert(REFERER, HeaderValue::from_static("https://ssstik.io/"));
        let size = download_to_file(
            &self.client,
            &video_url,
            &destination,
            headers,
            Duration::from_secs(40),
        )
        .await?;

        if size < MIN_VIDEO_BYTES {
            cleanup_file(&destination).await;
            return Err(DownloadError::TikTokEmptyFile);
        }

        Ok(DownloadResult::new(destination, title, None, MediaKind::Video))
    }
}
