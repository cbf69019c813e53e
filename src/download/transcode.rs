//! Re-encoding of videos Telegram clients cannot stream inline.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::DownloadError;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    channels: Option<u32>,
}

/// Returns whether the codec plays inline in Telegram clients without re-encoding.
#[must_use]
pub fn is_telegram_friendly_codec(codec: &str) -> bool {
    let lowered = codec.to_lowercase();
    lowered.starts_with("avc") || lowered.starts_with("h264")
}

/// Output path for a re-encode of `source`.
///
/// `clip.webm` becomes `clip.mp4`; an `.mp4` source gets an `_h264` suffix.
#[must_use]
pub fn transcode_target(source: &Path) -> PathBuf {
    let target = source.with_extension("mp4");
    if target == source {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        source.with_file_name(format!("{stem}_h264.mp4"))
    } else {
        target
    }
}

/// Arguments for an H.264 baseline re-encode with fast start.
#[must_use]
pub fn ffmpeg_args(source: &Path, target: &Path, has_audio: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-loglevel", "error", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(source.as_os_str().to_owned());

    let video = [
        "-c:v", "libx264", "-movflags", "+faststart", "-preset", "veryfast", "-crf", "23",
        "-pix_fmt", "yuv420p", "-profile:v", "baseline", "-level", "3.1", "-g", "48", "-vsync",
        "vfr",
    ];
    args.extend(video.into_iter().map(OsString::from));

    if has_audio {
        let audio = ["-c:a", "aac", "-b:a", "128k", "-ac", "2", "-ar", "48000"];
        args.extend(audio.into_iter().map(OsString::from));
    } else {
        args.push(OsString::from("-an"));
    }

    args.push(target.as_os_str().to_owned());
    args
}

fn parse_has_audio(ffprobe_json: &[u8]) -> Option<bool> {
    let output: FfprobeOutput = serde_json::from_slice(ffprobe_json).ok()?;
    Some(
        output
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"))
            .is_some_and(|s| s.channels.unwrap_or(0) > 0),
    )
}

/// Runs ffprobe/ffmpeg to make a file streamable in Telegram.
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg_bin: String,
    ffprobe_bin: String,
}

impl Transcoder {
    #[must_use]
    pub fn new(ffmpeg_bin: impl Into<String>, ffprobe_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    /// Returns whether the file has an audio stream with at least one channel.
    ///
    /// If probing fails the file is assumed to have audio.
    pub async fn has_audio(&self, path: &Path) -> bool {
        let output = Command::new(&self.ffprobe_bin)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => parse_has_audio(&out.stdout).unwrap_or_else(|| {
                warn!("Could not parse ffprobe output for {}", path.display());
                true
            }),
            Ok(out) => {
                warn!(
                    "ffprobe exited with {} for {}, assuming audio",
                    out.status,
                    path.display()
                );
                true
            }
            Err(e) => {
                warn!("Failed to run ffprobe: {}, assuming audio", e);
                true
            }
        }
    }

    /// Re-encodes `source` to a Telegram-friendly MP4.
    ///
    /// The source is removed in every case; on failure the partial target is
    /// removed too, so nothing is left behind in the download directory.
    pub async fn ensure_playable_mp4(&self, source: &Path) -> Result<PathBuf, DownloadError> {
        let has_audio = self.has_audio(source).await;
        let target = transcode_target(source);
        info!(
            "Transcoding {} -> {} (audio: {})",
            source.display(),
            target.display(),
            has_audio
        );

        let output = Command::new(&self.ffmpeg_bin)
            .args(ffmpeg_args(source, &target, has_audio))
            .kill_on_drop(true)
            .output()
            .await;
        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to run ffmpeg: {}", e);
                super::http::cleanup_file(source).await;
                return Err(DownloadError::Transcode);
            }
        };

        if !output.status.success() {
            warn!(
                "ffmpeg failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            super::http::cleanup_file(&target).await;
            super::http::cleanup_file(source).await;
            return Err(DownloadError::Transcode);
        }

        if target.exists()
            && target != source
            && let Err(e) = tokio::fs::remove_file(source).await
        {
            debug!("Could not remove original {}: {}", source.display(), e);
        }

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friendly_codecs() {
        assert!(is_telegram_friendly_codec("avc1.64001F"));
        assert!(is_telegram_friendly_codec("H264"));
        assert!(!is_telegram_friendly_codec("vp09.00.40.08"));
        assert!(!is_telegram_friendly_codec("hevc"));
    }

    #[test]
    fn test_transcode_target() {
        assert_eq!(
            transcode_target(Path::new("downloads/abc.webm")),
            PathBuf::from("downloads/abc.mp4")
        );
        assert_eq!(
            transcode_target(Path::new("downloads/abc.mp4")),
            PathBuf::from("downloads/abc_h264.mp4")
        );
    }

    #[test]
    fn test_ffmpeg_args_audio_choice() {
        let with_audio = ffmpeg_args(Path::new("in.webm"), Path::new("out.mp4"), true);
        assert!(with_audio.contains(&OsString::from("aac")));
        assert!(!with_audio.contains(&OsString::from("-an")));
        assert_eq!(with_audio.last(), Some(&OsString::from("out.mp4")));

        let silent = ffmpeg_args(Path::new("in.webm"), Path::new("out.mp4"), false);
        assert!(silent.contains(&OsString::from("-an")));
        assert!(silent.contains(&OsString::from("baseline")));
    }

    #[test]
    fn test_parse_has_audio() {
        let json = br#"{"streams":[{"codec_type":"video"},{"codec_type":"audio","channels":2}]}"#;
        assert_eq!(parse_has_audio(json), Some(true));

        let muted = br#"{"streams":[{"codec_type":"video"},{"codec_type":"audio","channels":0}]}"#;
        assert_eq!(parse_has_audio(muted), Some(false));

        assert_eq!(parse_has_audio(br#"{"streams":[]}"#), Some(false));
        assert_eq!(parse_has_audio(b"garbage"), None);
    }

    #[tokio::test]
    async fn test_failed_transcode_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.webm");
        std::fs::write(&source, b"not really a video").unwrap();

        let transcoder = Transcoder::new("false", "false");
        let result = transcoder.ensure_playable_mp4(&source).await;

        assert!(matches!(result, Err(DownloadError::Transcode)));
        assert!(!source.exists());
        assert!(!dir.path().join("clip.mp4").exists());
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.webm");
        std::fs::write(&source, b"not really a video").unwrap();

        let transcoder = Transcoder::new("definitely-not-a-real-ffmpeg", "false");
        assert!(transcoder.ensure_playable_mp4(&source).await.is_err());
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn test_missing_ffprobe_assumes_audio() {
        let transcoder = Transcoder::new("ffmpeg", "definitely-not-a-real-ffprobe");
        assert!(transcoder.has_audio(Path::new("x.mp4")).await);
    }
}
