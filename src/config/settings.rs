//! Process settings loaded from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use teloxide::types::UserId;

/// Default desktop User-Agent presented to media hosts.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

/// Lower bound for the yt-dlp socket timeout.
pub const MIN_SOCKET_TIMEOUT_SECS: u64 = 10;

/// Lower bound for the wall-clock limit of one yt-dlp run.
pub const MIN_PROCESS_TIMEOUT_SECS: u64 = 60;

/// Lower bound for the profile badge refresh interval.
pub const MIN_PROFILE_UPDATE_INTERVAL_SECS: u64 = 300;

/// Bot credentials and ownership.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Bot API token issued by `@BotFather`.
    pub token: String,

    /// The main admin. Always an admin, cannot be removed.
    pub main_admin_id: UserId,
}

impl BotConfig {
    /// Creates configuration from environment variables.
    ///
    /// Expects `BOT_TOKEN` and `MAIN_ADMIN_ID` to be set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("BOT_TOKEN"))?;

        let main_admin_id: u64 = std::env::var("MAIN_ADMIN_ID")
            .map_err(|_| ConfigError::MissingEnvVar("MAIN_ADMIN_ID"))?
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber("MAIN_ADMIN_ID"))?;

        Ok(Self {
            token,
            main_admin_id: UserId(main_admin_id),
        })
    }
}

/// Download pipeline settings.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Working directory for fetched media.
    pub download_dir: PathBuf,

    /// Optional proxy for yt-dlp and scraping requests.
    pub proxy: Option<String>,

    /// Socket timeout handed to yt-dlp and the HTTP client.
    pub socket_timeout: Duration,

    /// Number of attempts for a yt-dlp download.
    pub retries: u32,

    /// Wall-clock limit for one yt-dlp run. The process is killed after it.
    pub process_timeout: Duration,

    /// User-Agent presented to media hosts.
    pub user_agent: String,

    /// yt-dlp executable.
    pub ytdlp_bin: String,

    /// ffmpeg executable.
    pub ffmpeg_bin: String,

    /// ffprobe executable.
    pub ffprobe_bin: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            proxy: None,
            socket_timeout: Duration::from_secs(25),
            retries: 3,
            process_timeout: Duration::from_secs(600),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            ytdlp_bin: "yt-dlp".to_owned(),
            ffmpeg_bin: "ffmpeg".to_owned(),
            ffprobe_bin: "ffprobe".to_owned(),
        }
    }
}

/// Everything the bot needs besides its credentials.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// SQLite database file.
    pub database_path: PathBuf,

    /// Where backups are written.
    pub backup_dir: PathBuf,

    /// Where `bot.log` is written.
    pub log_dir: PathBuf,

    /// Download pipeline settings.
    pub download: DownloadSettings,

    /// Whether the profile badge scheduler runs.
    pub profile_badge_enabled: bool,

    /// Interval between profile badge refreshes.
    pub profile_update_interval: Duration,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data").join("bot.db"),
            backup_dir: PathBuf::from("backups"),
            log_dir: PathBuf::from("logs"),
            download: DownloadSettings::default(),
            profile_badge_enabled: false,
            profile_update_interval: Duration::from_secs(3600),
        }
    }
}

impl BotSettings {
    /// Reads optional settings from the environment, falling back to defaults.
    ///
    /// Values that are present but malformed are rejected rather than ignored.
    pub fn from_env_with_defaults() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let socket_timeout_secs: u64 = parse_env("DOWNLOAD_SOCKET_TIMEOUT")?
            .unwrap_or(defaults.download.socket_timeout.as_secs())
            .max(MIN_SOCKET_TIMEOUT_SECS);
        let retries: u32 = parse_env("DOWNLOAD_RETRIES")?
            .unwrap_or(defaults.download.retries)
            .max(1);
        let process_timeout_secs: u64 = parse_env("DOWNLOAD_PROCESS_TIMEOUT")?
            .unwrap_or(defaults.download.process_timeout.as_secs())
            .max(MIN_PROCESS_TIMEOUT_SECS);
        let interval_secs: u64 = parse_env("PROFILE_UPDATE_INTERVAL")?
            .unwrap_or(defaults.profile_update_interval.as_secs())
            .max(MIN_PROFILE_UPDATE_INTERVAL_SECS);

        let download = DownloadSettings {
            download_dir: env_path("DOWNLOAD_DIR").unwrap_or(defaults.download.download_dir),
            proxy: env_string("DOWNLOAD_PROXY"),
            socket_timeout: Duration::from_secs(socket_timeout_secs),
            retries,
            process_timeout: Duration::from_secs(process_timeout_secs),
            user_agent: env_string("DOWNLOAD_USER_AGENT").unwrap_or(defaults.download.user_agent),
            ytdlp_bin: env_string("YTDLP_BIN").unwrap_or(defaults.download.ytdlp_bin),
            ffmpeg_bin: env_string("FFMPEG_BIN").unwrap_or(defaults.download.ffmpeg_bin),
            ffprobe_bin: env_string("FFPROBE_BIN").unwrap_or(defaults.download.ffprobe_bin),
        };

        Ok(Self {
            database_path: env_path("DATABASE_PATH").unwrap_or(defaults.database_path),
            backup_dir: env_path("BACKUP_DIR").unwrap_or(defaults.backup_dir),
            log_dir: env_path("LOG_DIR").unwrap_or(defaults.log_dir),
            download,
            profile_badge_enabled: env_string("PROFILE_BADGE_ENABLED")
                .is_some_and(|v| super::is_truthy(&v)),
            profile_update_interval: Duration::from_secs(interval_secs),
        })
    }

    /// Directories that must exist before the bot starts.
    #[must_use]
    pub fn runtime_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![
            self.download.download_dir.clone(),
            self.log_dir.clone(),
            self.backup_dir.clone(),
        ];
        if let Some(parent) = self.database_path.parent()
            && !parent.as_os_str().is_empty()
        {
            dirs.push(parent.to_path_buf());
        }
        dirs
    }

    /// Creates every runtime directory that does not exist yet.
    pub fn ensure_runtime_dirs(&self) -> std::io::Result<()> {
        for dir in self.runtime_dirs() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_path(name: &str) -> Option<PathBuf> {
    env_string(name).map(PathBuf::from)
}

fn parse_env<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    env_string(name)
        .map(|raw| raw.parse().map_err(|_| ConfigError::InvalidNumber(name)))
        .transpose()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Environment variable {0} must be a non-negative integer")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = BotSettings::default();
        assert_eq!(settings.database_path, PathBuf::from("data").join("bot.db"));
        assert_eq!(settings.download.socket_timeout, Duration::from_secs(25));
        assert_eq!(settings.download.retries, 3);
        assert_eq!(settings.download.process_timeout, Duration::from_secs(600));
        assert!(!settings.profile_badge_enabled);
    }

    #[test]
    fn test_runtime_dirs_cover_layout() {
        let settings = BotSettings::default();
        let dirs = settings.runtime_dirs();
        for expected in ["downloads", "logs", "backups", "data"] {
            assert!(dirs.contains(&PathBuf::from(expected)), "missing {expected}");
        }
    }

    #[test]
    fn test_ensure_runtime_dirs_creates_directories() {
        let root = tempfile::tempdir().unwrap();
        let settings = BotSettings {
            database_path: root.path().join("data").join("bot.db"),
            backup_dir: root.path().join("backups"),
            log_dir: root.path().join("logs"),
            download: DownloadSettings {
                download_dir: root.path().join("downloads"),
                ..DownloadSettings::default()
            },
            ..BotSettings::default()
        };

        settings.ensure_runtime_dirs().unwrap();

        for dir in ["downloads", "logs", "backups", "data"] {
            assert!(root.path().join(dir).is_dir());
        }
    }

    #[test]
    fn test_bare_database_file_adds_no_parent() {
        let settings = BotSettings {
            database_path: PathBuf::from("bot.db"),
            ..BotSettings::default()
        };
        assert_eq!(settings.runtime_dirs().len(), 3);
    }
}
