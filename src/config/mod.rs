//! Configuration module for the media saver bot.
//!
//! Process configuration comes from the environment. Texts and flags that
//! admins edit at runtime live in the database; their keys and factory
//! values are defined in [`defaults`].

pub mod defaults;
mod settings;

pub use defaults::{default_setting, is_truthy};
pub use settings::{
    BotConfig, BotSettings, ConfigError, DEFAULT_USER_AGENT, DownloadSettings,
    MIN_PROCESS_TIMEOUT_SECS, MIN_PROFILE_UPDATE_INTERVAL_SECS, MIN_SOCKET_TIMEOUT_SECS,
};

/// Largest file a bot may upload, in bytes.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;
