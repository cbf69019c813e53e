//! Instagram posts and reels through the public JSON endpoint.
//!
//! The web endpoint (`?__a=1&__d=dis`) is tried first. When it refuses or
//! answers with an unexpected shape, the post page itself is fetched and the
//! embedded JSON (`__NEXT_DATA__`, or the older `entry_data` blob) is used.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT};
use scraper::{Html, Selector};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::http::download_to_file;
use super::{DownloadError, DownloadResult, MediaKind};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const IG_APP_ID: &str = "936619743392459";

/// The parts of a post link needed to fetch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstagramPost {
    pub shortcode: String,
    /// `p`, `reel` or `tv`.
    pub media_type: String,
    /// 1-based carousel position from `img_index`.
    pub img_index: Option<usize>,
}

impl InstagramPost {
    /// Parses `https://www.instagram.com/<p|reel|tv>/<shortcode>/?img_index=N`.
    #[must_use]
    pub fn parse(url: &str) -> Option<Self> {
        let parsed = url::Url::parse(url).ok()?;
        let parts: Vec<&str> = parsed
            .path_segments()?
            .filter(|s| !s.is_empty())
            .collect();
        let first = *parts.first()?;

        let shortcode = parts.get(1).copied().unwrap_or(first);
        if shortcode.is_empty() {
            return None;
        }

        let media_type = match first.to_lowercase().as_str() {
            kind @ ("p" | "reel" | "tv") => kind.to_owned(),
            _ => "p".to_owned(),
        };

        let img_index = parsed
            .query_pairs()
            .find(|(k, _)| k == "img_index")
            .and_then(|(_, v)| v.parse().ok());

        Some(Self {
            shortcode: shortcode.to_owned(),
            media_type,
            img_index,
        })
    }

    fn page_url(&self) -> String {
        format!(
            "https://www.instagram.com/{}/{}/",
            self.media_type, self.shortcode
        )
    }
}

/// Pulls the post JSON out of a post page.
#[must_use]
pub fn extract_payload_from_html(html: &str) -> Option<Value> {
    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse(r#"script#__NEXT_DATA__"#)
        && let Some(script) = document.select(&selector).next()
    {
        let text: String = script.text().collect();
        match serde_json::from_str::<Value>(&text) {
            Ok(data) => {
                let graphql = &data["props"]["pageProps"]["graphql"];
                if graphql.get("shortcode_media").is_some() || graphql.get("reel").is_some() {
                    return Some(json!({ "graphql": graphql }));
                }
            }
            Err(e) => debug!("__NEXT_DATA__ is not valid JSON: {}", e),
        }
    }

    let selector = Selector::parse(r#"script[type="application/json"]"#).ok()?;
    document
        .select(&selector)
        .map(|script| script.text().collect::<String>())
        .filter(|text| text.trim_start().starts_with(r#"{"require_login""#))
        .filter_map(|text| serde_json::from_str::<Value>(&text).ok())
        .find_map(|data| {
            data["entry_data"]["PostPage"]
                .as_array()?
                .iter()
                .map(|page| &page["graphql"])
                .find(|graphql| graphql.get("shortcode_media").is_some())
                .map(|graphql| json!({ "graphql": graphql }))
        })
}

fn has_media(payload: &Value) -> bool {
    payload.get("graphql").is_some_and(|g| !g.is_null())
        || payload["items"].as_array().is_some_and(|items| !items.is_empty())
}

/// The post object inside a payload.
#[must_use]
pub fn payload_media(payload: &Value) -> Option<&Value> {
    payload["graphql"]
        .get("shortcode_media")
        .filter(|m| !m.is_null())
        .or_else(|| payload["items"].as_array()?.first())
}

/// Carousel children, or the post itself for single media.
#[must_use]
pub fn media_nodes(media: &Value) -> Vec<&Value> {
    match media["edge_sidecar_to_children"]["edges"].as_array() {
        Some(edges) => edges
            .iter()
            .map(|edge| &edge["node"])
            .filter(|node| node.is_object())
            .collect(),
        None => vec![media],
    }
}

/// Zero-based node to deliver. Out-of-range requests fall back to the first node.
#[must_use]
pub fn choose_node(total: usize, requested: Option<usize>) -> usize {
    match requested {
        Some(n) if (1..=total).contains(&n) => n - 1,
        Some(n) => {
            info!(
                "img_index={} out of range ({} media), using the first one",
                n, total
            );
            0
        }
        None => 0,
    }
}

/// First non-empty caption, else the accessibility caption.
#[must_use]
pub fn caption(media: &Value) -> Option<String> {
    media["edge_media_to_caption"]["edges"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|edge| edge["node"]["text"].as_str())
        .map(str::trim)
        .find(|text| !text.is_empty())
        .or_else(|| {
            media["accessibility_caption"]
                .as_str()
                .map(str::trim)
                .filter(|t| !t.is_empty())
        })
        .map(str::to_owned)
}

/// Media URL of a node and whether it is a video.
#[must_use]
pub fn node_source(node: &Value) -> Option<(String, MediaKind)> {
    if node["is_video"].as_bool() == Some(true)
        && let Some(video) = node["video_url"].as_str()
    {
        return Some((video.to_owned(), MediaKind::Video));
    }

    node["display_url"]
        .as_str()
        .or_else(|| node["display_resources"].as_array()?.last()?["src"].as_str())
        .or_else(|| node["thumbnail_src"].as_str())
        .map(|url| (url.to_owned(), MediaKind::Photo))
}

/// File extension from a media URL path, or `default`.
#[must_use]
pub fn extension_from_url(media_url: &str, default: &str) -> String {
    url::Url::parse(media_url)
        .ok()
        .and_then(|u| {
            let path = std::path::Path::new(u.path()).to_path_buf();
            path.extension().map(|e| e.to_string_lossy().into_owned())
        })
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| default.to_owned())
}

/// Downloads single posts, reels and carousel items.
#[derive(Debug, Clone)]
pub struct InstagramDownloader {
    client: Client,
    download_dir: PathBuf,
    user_agent: String,
}

impl InstagramDownloader {
    #[must_use]
    pub fn new(client: Client, download_dir: PathBuf, user_agent: String) -> Self {
        Self {
            client,
            download_dir,
            user_agent,
        }
    }

    fn headers(&self, accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(REFERER, HeaderValue::from_static("https://www.instagram.com/"));
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        headers.insert(
            HeaderName::from_static("x-ig-app-id"),
            HeaderValue::from_static(IG_APP_ID),
        );
        headers
    }

    pub async fn download(&self, url: &str) -> Result<DownloadResult, DownloadError> {
        let post = InstagramPost::parse(url).ok_or(DownloadError::InvalidInstagramUrl)?;
        let payload = self.fetch_payload(&post).await?;

        let media = payload_media(&payload).ok_or(DownloadError::MediaMissing)?;
        let nodes = media_nodes(media);
        if nodes.is_empty() {
            return Err(DownloadError::MediaMissing);
        }

        let index = choose_node(nodes.len(), post.img_index);
        let node = nodes[index];
        let title = caption(media).unwrap_or_else(|| format!("Instagram {}", post.shortcode));

        let (source, kind) = node_source(node).ok_or(DownloadError::MediaMissing)?;
        let ext = extension_from_url(&source, if kind == MediaKind::Video { "mp4" } else { "jpg" });
        let suffix = if nodes.len() > 1 {
            format!("_{}", index + 1)
        } else {
            String::new()
        };
        let destination = self
            .download_dir
            .join(format!("{}{suffix}.{ext}", post.shortcode));

        download_to_file(
            &self.client,
            &source,
            &destination,
            self.headers("*/*"),
            REQUEST_TIMEOUT,
        )
        .await?;

        let duration = match kind {
            MediaKind::Video => node["video_duration"]
                .as_f64()
                .or_else(|| media["video_duration"].as_f64()),
            MediaKind::Photo => None,
        };

        Ok(DownloadResult::new(destination, title, duration, kind))
    }

    async fn fetch_payload(&self, post: &InstagramPost) -> Result<Value, DownloadError> {
        let endpoint = post.page_url();
        let response = self
            .client
            .get(format!("{endpoint}?__a=1&__d=dis"))
            .headers(self.headers("application/json"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                warn!("Instagram request failed: {}", e);
                DownloadError::InstagramUnreachable
            })?;

        let status = response.status();
        if status.is_success() {
            match response.json::<Value>().await {
                Ok(data) if has_media(&data) => return Ok(data),
                Ok(_) => debug!("Instagram JSON has an unexpected shape, trying HTML"),
                Err(e) => debug!("Instagram JSON unreadable, trying HTML: {}", e),
            }
        }

        info!("Instagram JSON endpoint returned {}, trying HTML", status);
        self.fetch_payload_from_html(&endpoint).await
    }

    async fn fetch_payload_from_html(&self, page_url: &str) -> Result<Value, DownloadError> {
        let response = self
            .client
            .get(page_url)
            .headers(self.headers(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                warn!("Instagram page request failed: {}", e);
                DownloadError::InstagramPayload
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DownloadError::InstagramNotFound);
        }
        if !response.status().is_success() {
            warn!("Instagram page status: {}", response.status());
            return Err(DownloadError::InstagramPayload);
        }

        let html = response.text().await.map_err(|e| {
            warn!("Instagram page body unreadable: {}", e);
            DownloadError::InstagramPayload
        })?;

        extract_payload_from_html(&html).ok_or_else(|| {
            warn!("No media data found in the Instagram page");
            DownloadError::InstagramPayload
        })
    }
}
