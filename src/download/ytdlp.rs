//! Generic extractor backed by the `yt-dlp` executable.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{error, info, warn};

use super::http::ACCEPT_LANGUAGE_VALUE;
use super::transcode::{Transcoder, is_telegram_friendly_codec};
use super::{DownloadError, DownloadResult, MediaKind, Platform};
use crate::config::DownloadSettings;

/// Prefers H.264/AAC streams so most results need no re-encode.
pub const FORMAT_SELECTOR: &str = "bestvideo[ext=mp4][vcodec~=avc]+bestaudio[ext=m4a]/\
bestvideo[ext=mp4]+bestaudio[ext=m4a]/bestvideo*+bestaudio/best";

/// Extensions tried, in order, when the reported output file is missing.
const FALLBACK_EXTENSIONS: &[&str] = &["mp4", "jpg", "jpeg", "png", "webp", "mkv", "webm"];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Format entry as reported by yt-dlp.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatInfo {
    pub vcodec: Option<String>,
    pub filepath: Option<String>,
}

/// The subset of yt-dlp's info JSON the bot relies on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    #[serde(rename = "_type")]
    pub kind: Option<String>,
    pub id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    #[serde(rename = "_filename")]
    pub filename: Option<String>,
    pub entries: Option<Vec<Option<MediaInfo>>>,
    pub requested_formats: Option<Vec<FormatInfo>>,
    pub requested_downloads: Option<Vec<FormatInfo>>,
    pub formats: Option<Vec<FormatInfo>>,
}

fn real_codec(codec: Option<&str>) -> Option<&str> {
    codec
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none"))
}

impl MediaInfo {
    fn is_playlist(&self) -> bool {
        self.kind.as_deref() == Some("playlist")
    }

    /// Video codec of the downloaded media, looking into the format lists if needed.
    #[must_use]
    pub fn video_codec(&self) -> Option<&str> {
        if let Some(codec) = real_codec(self.vcodec.as_deref()) {
            return Some(codec);
        }
        [&self.requested_formats, &self.requested_downloads, &self.formats]
            .into_iter()
            .flatten()
            .flatten()
            .find_map(|f| real_codec(f.vcodec.as_deref()))
    }

    /// Where yt-dlp reports it wrote the file.
    fn reported_path(&self, download_dir: &Path) -> Option<PathBuf> {
        self.requested_downloads
            .iter()
            .flatten()
            .find_map(|d| d.filepath.clone())
            .or_else(|| self.filename.clone())
            .map(PathBuf::from)
            .or_else(|| {
                let id = self.id.as_deref()?;
                let ext = self.ext.as_deref().unwrap_or("mp4");
                Some(download_dir.join(format!("{id}.{ext}")))
            })
    }
}

/// Picks the entry to deliver from a playlist result.
///
/// First an entry with a real video codec, then any non-image entry, then the first one.
pub fn select_entry(info: MediaInfo) -> Result<MediaInfo, DownloadError> {
    if !info.is_playlist() {
        return Ok(info);
    }

    let entries: Vec<MediaInfo> = info.entries.unwrap_or_default().into_iter().flatten().collect();
    if entries.is_empty() {
        return Err(DownloadError::MediaMissing);
    }

    let index = entries
        .iter()
        .position(|e| real_codec(e.vcodec.as_deref()).is_some())
        .or_else(|| {
            entries.iter().position(|e| {
                e.ext.as_deref().is_some_and(|ext| {
                    let ext = ext.to_lowercase();
                    !ext.is_empty() && !IMAGE_EXTENSIONS.contains(&ext.as_str()) && ext != "ico"
                })
            })
        })
        .unwrap_or(0);

    let chosen = entries.into_iter().nth(index).ok_or(DownloadError::MediaMissing)?;
    info!(
        "Selected playlist entry id={:?} ext={:?}",
        chosen.id, chosen.ext
    );
    Ok(chosen)
}

/// Finds the file yt-dlp actually produced, trying sibling extensions when needed.
#[must_use]
pub fn resolve_output(expected: &Path) -> Option<PathBuf> {
    if expected.exists() {
        return Some(expected.to_path_buf());
    }
    FALLBACK_EXTENSIONS
        .iter()
        .map(|ext| expected.with_extension(ext))
        .find(|candidate| candidate.exists())
}

/// Photo or video, by file extension.
#[must_use]
pub fn media_kind_for(path: &Path) -> MediaKind {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Photo
    } else {
        MediaKind::Video
    }
}

/// Delay before retry number `attempt` (1-based): `min(2^attempt, 10)` seconds.
#[must_use]
pub fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2_u64.saturating_pow(attempt).min(10))
}

/// Drives the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    settings: DownloadSettings,
}

impl YtDlp {
    #[must_use]
    pub fn new(settings: DownloadSettings) -> Self {
        Self { settings }
    }

    /// Command line for downloading `url` and printing the resulting info JSON.
    #[must_use]
    pub fn args(&self, url: &str, platform: Platform) -> Vec<String> {
        let s = &self.settings;
        let template = s.download_dir.join("%(id)s.%(ext)s");
        let retries = s.retries.max(1).to_string();

        let mut args: Vec<String> = vec![
            "--no-progress".into(),
            "--quiet".into(),
            "--no-warnings".into(),
            "--no-write-subs".into(),
            "--no-write-auto-subs".into(),
            "--no-check-certificates".into(),
            "--geo-bypass".into(),
            "--socket-timeout".into(),
            s.socket_timeout.as_secs().to_string(),
            "--retries".into(),
            retries.clone(),
            "--fragment-retries".into(),
            retries,
            "--user-agent".into(),
            s.user_agent.clone(),
            "--add-header".into(),
            format!("Referer:{}", platform.referer()),
            "--add-header".into(),
            format!("Accept-Language:{ACCEPT_LANGUAGE_VALUE}"),
            "-f".into(),
            FORMAT_SELECTOR.into(),
            "-o".into(),
            template.to_string_lossy().into_owned(),
            "--dump-single-json".into(),
            "--no-simulate".into(),
        ];

        if let Some(proxy) = &s.proxy {
            args.push("--proxy".into());
            args.push(proxy.clone());
        }

        args.push("--".into());
        args.push(url.to_owned());
        args
    }

    /// One yt-dlp run, killed once `process_timeout` elapses.
    async fn run(&self, args: &[String]) -> Result<Output, DownloadError> {
        let child = Command::new(&self.settings.ytdlp_bin)
            .args(args)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.settings.process_timeout, child).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                error!("Failed to run {}: {}", self.settings.ytdlp_bin, e);
                Err(DownloadError::Unexpected)
            }
            Err(_) => {
                warn!(
                    "yt-dlp stalled for {} seconds, killed",
                    self.settings.process_timeout.as_secs()
                );
                Err(DownloadError::TimedOut)
            }
        }
    }

    /// Runs yt-dlp with retries and returns the parsed info JSON.
    ///
    /// A run that hits the time limit is not retried.
    async fn extract(&self, url: &str, platform: Platform) -> Result<MediaInfo, DownloadError> {
        let attempts = self.settings.retries.max(1);
        let args = self.args(url, platform);

        for attempt in 1..=attempts {
            info!("yt-dlp download started: {} (attempt {}/{})", url, attempt, attempts);
            let output = self.run(&args).await?;

            if output.status.success() {
                return serde_json::from_slice(&output.stdout).map_err(|e| {
                    warn!("Unreadable yt-dlp output: {}", e);
                    DownloadError::NoMetadata
                });
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "yt-dlp attempt {}/{} failed: {}",
                attempt,
                attempts,
                stderr.trim()
            );
            if attempt >= attempts {
                return Err(DownloadError::from_extractor_output(&stderr));
            }
            tokio::time::sleep(retry_backoff(attempt)).await;
        }

        Err(DownloadError::NoMetadata)
    }

    /// Downloads `url`, resolves the produced file and re-encodes non-H.264 video.
    pub async fn download(
        &self,
        url: &str,
        platform: Platform,
        transcoder: &Transcoder,
    ) -> Result<DownloadResult, DownloadError> {
        let info = select_entry(self.extract(url, platform).await?)?;

        let expected = info
            .reported_path(&self.settings.download_dir)
            .ok_or(DownloadError::OutputMissing)?;
        let Some(mut path) = resolve_output(&expected) else {
            error!("Downloaded file not found, expected {}", expected.display());
            return Err(DownloadError::OutputMissing);
        };

        let kind = media_kind_for(&path);
        if kind == MediaKind::Video
            && let Some(codec) = info.video_codec()
            && !is_telegram_friendly_codec(codec)
        {
            info!("Codec {} is not Telegram friendly, re-encoding", codec);
            path = transcoder.ensure_playable_mp4(&path).await?;
        }

        Ok(DownloadResult::new(
            path,
            info.title.unwrap_or_else(|| format!("{platform} media")),
            info.duration,
            kind,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(json: &str) -> MediaInfo {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_info_with_null_entries() {
        let info = entry(
            r#"{"_type":"playlist","entries":[null,{"id":"b","ext":"mp4","vcodec":"avc1"}],
                "requested_formats":null}"#,
        );
        let chosen = select_entry(info).unwrap();
        assert_eq!(chosen.id.as_deref(), Some("b"));
    }

    #[test]
    fn test_select_entry_prefers_video_codec() {
        let info = entry(
            r#"{"_type":"playlist","entries":[
                {"id":"1","ext":"jpg","vcodec":"none"},
                {"id":"2","ext":"webm"},
                {"id":"3","ext":"mp4","vcodec":"vp9"}]}"#,
        );
        assert_eq!(select_entry(info).unwrap().id.as_deref(), Some("3"));
    }

    #[test]
    fn test_select_entry_falls_back_to_non_image_then_first() {
        let info = entry(
            r#"{"_type":"playlist","entries":[{"id":"1","ext":"jpg"},{"id":"2","ext":"webm"}]}"#,
        );
        assert_eq!(select_entry(info).unwrap().id.as_deref(), Some("2"));

        let info = entry(
            r#"{"_type":"playlist","entries":[{"id":"1","ext":"png"},{"id":"2","ext":"ico"}]}"#,
        );
        assert_eq!(select_entry(info).unwrap().id.as_deref(), Some("1"));

        let empty = entry(r#"{"_type":"playlist","entries":[]}"#);
        assert!(matches!(select_entry(empty), Err(DownloadError::MediaMissing)));
    }

    #[test]
    fn test_video_codec_lookup() {
        let info = entry(
            r#"{"vcodec":"none","requested_formats":[{"vcodec":"none"},{"vcodec":"avc1.4d401f"}]}"#,
        );
        assert_eq!(info.video_codec(), Some("avc1.4d401f"));
        assert_eq!(entry("{}").video_codec(), None);
    }

    #[test]
    fn test_reported_path_preference() {
        let dir = Path::new("downloads");
        let info = entry(
            r#"{"id":"x","ext":"webm","_filename":"downloads/x.webm",
                "requested_downloads":[{"filepath":"downloads/x.mp4"}]}"#,
        );
        assert_eq!(info.reported_path(dir), Some(PathBuf::from("downloads/x.mp4")));

        let info = entry(r#"{"id":"y","ext":"mkv"}"#);
        assert_eq!(info.reported_path(dir), Some(PathBuf::from("downloads/y.mkv")));
    }

    #[test]
    fn test_resolve_output_tries_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let produced = dir.path().join("abc.webp");
        std::fs::write(&produced, b"img").unwrap();

        assert_eq!(resolve_output(&dir.path().join("abc.unknown_video")), Some(produced));
        assert_eq!(resolve_output(&dir.path().join("zzz.mp4")), None);
    }

    #[test]
    fn test_media_kind_for() {
        assert_eq!(media_kind_for(Path::new("a.JPG")), MediaKind::Photo);
        assert_eq!(media_kind_for(Path::new("a.webp")), MediaKind::Photo);
        assert_eq!(media_kind_for(Path::new("a.mkv")), MediaKind::Video);
    }

    #[test]
    fn test_retry_backoff_is_capped() {
        assert_eq!(retry_backoff(1), Duration::from_secs(2));
        assert_eq!(retry_backoff(3), Duration::from_secs(8));
        assert_eq!(retry_backoff(4), Duration::from_secs(10));
        assert_eq!(retry_backoff(40), Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stalled_extractor_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("yt-dlp");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let settings = DownloadSettings {
            download_dir: dir.path().to_path_buf(),
            ytdlp_bin: script.to_string_lossy().into_owned(),
            process_timeout: Duration::from_millis(200),
            retries: 3,
            ..DownloadSettings::default()
        };
        let started = std::time::Instant::now();
        let result = YtDlp::new(settings)
            .extract("https://youtu.be/x", Platform::YouTube)
            .await;

        assert!(matches!(result, Err(DownloadError::TimedOut)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_args_include_proxy_and_referer() {
        let settings = DownloadSettings {
            proxy: Some("socks5://127.0.0.1:1080".to_owned()),
            ..DownloadSettings::default()
        };
        let args = YtDlp::new(settings).args("https://youtu.be/x", Platform::YouTube);

        assert!(args.windows(2).any(|w| w[0] == "--proxy" && w[1] == "socks5://127.0.0.1:1080"));
        assert!(args.contains(&"Referer:https://www.youtube.com/".to_owned()));
        assert!(args.windows(2).any(|w| w[0] == "--socket-timeout" && w[1] == "25"));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/x"));
    }
}
