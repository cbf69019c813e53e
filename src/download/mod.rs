//! Media download pipeline.
//!
//! Links are routed by platform:
//! - Instagram: JSON endpoint first, `yt-dlp` when that fails
//! - TikTok: ssstik.io only
//! - everything else: `yt-dlp`
//!
//! Files land in the configured download directory and must be removed by
//! the caller with [`cleanup_file`] once delivered.

mod error;
mod http;
pub mod instagram;
pub mod platform;
pub mod tiktok;
pub mod transcode;
pub mod ytdlp;

use std::path::PathBuf;

use tracing::info;

pub use error::DownloadError;
pub use http::cleanup_file;
pub use instagram::InstagramDownloader;
pub use platform::{Platform, extract_supported_url, is_supported_url};
pub use tiktok::TikTokDownloader;
pub use transcode::Transcoder;
pub use ytdlp::YtDlp;

use crate::config::DownloadSettings;

/// How a result should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Photo,
}

/// A file ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    pub file_path: PathBuf,
    pub title: String,
    /// Duration in seconds, when the source reports it.
    pub duration: Option<f64>,
    /// Lowercase extension without the dot.
    pub ext: String,
    pub kind: MediaKind,
}

impl DownloadResult {
    /// Builds a result, taking the extension from the file name.
    #[must_use]
    pub fn new(file_path: PathBuf, title: String, duration: Option<f64>, kind: MediaKind) -> Self {
        let ext = file_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Self {
            file_path,
            title,
            duration,
            ext,
            kind,
        }
    }
}

/// Entry point of the pipeline: picks a backend per platform.
#[derive(Debug, Clone)]
pub struct Downloader {
    settings: DownloadSettings,
    instagram: InstagramDownloader,
    tiktok: TikTokDownloader,
    ytdlp: YtDlp,
    transcoder: Transcoder,
}

impl Downloader {
    /// Builds the downloader and its shared HTTP client.
    pub fn new(settings: DownloadSettings) -> anyhow::Result<Self> {
        let client = http::build_client(&settings)?;
        Ok(Self {
            instagram: InstagramDownloader::new(
                client.clone(),
                settings.download_dir.clone(),
                settings.user_agent.clone(),
            ),
            tiktok: TikTokDownloader::new(
                client,
                settings.download_dir.clone(),
                settings.user_agent.clone(),
            ),
            ytdlp: YtDlp::new(settings.clone()),
            transcoder: Transcoder::new(&settings.ffmpeg_bin, &settings.ffprobe_bin),
            settings,
        })
    }

    /// Downloads the media behind `url`.
    pub async fn download(&self, url: &str) -> Result<DownloadResult, DownloadError> {
        tokio::fs::create_dir_all(&self.settings.download_dir)
            .await
            .map_err(|e| {
                tracing::error!("Cannot create download directory: {}", e);
                DownloadError::Unexpected
            })?;

        let platform = Platform::detect(url);
        match platform {
            Platform::Instagram => match self.instagram.download(url).await {
                Ok(result) => Ok(result),
                Err(e) => {
                    info!("Instagram JSON API failed ({}), falling back to yt-dlp", e);
                    self.ytdlp.download(url, platform, &self.transcoder).await
                }
            },
            Platform::TikTok => self.tiktok.download(url).await,
            Platform::Snapchat | Platform::Likee | Platform::YouTube | Platform::Other => {
                self.ytdlp.download(url, platform, &self.transcoder).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_extension_from_path() {
        let result = DownloadResult::new(
            PathBuf::from("downloads/abc.MP4"),
            "t".into(),
            Some(3.0),
            MediaKind::Video,
        );
        assert_eq!(result.ext, "mp4");

        let bare = DownloadResult::new(PathBuf::from("downloads/abc"), "t".into(), None, MediaKind::Photo);
        assert_eq!(bare.ext, "");
    }

    #[test]
    fn test_downloader_builds_with_defaults() {
        assert!(Downloader::new(DownloadSettings::default()).is_ok());
    }
}
