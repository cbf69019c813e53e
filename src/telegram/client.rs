//! Bot construction and Bot API error classification.

use std::time::Duration;

use teloxide::adaptors::DefaultParseMode;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode, UserId};
use teloxide::{ApiError, RequestError};
use thiserror::Error;

/// The bot handle used everywhere. All text is sent as HTML.
pub type Bot = DefaultParseMode<teloxide::Bot>;

/// Creates the bot client for `token`.
#[must_use]
pub fn build_bot(token: &str) -> Bot {
    teloxide::Bot::new(token).parse_mode(ParseMode::Html)
}

/// Bot API failures, grouped by how callers react to them.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Flood wait required: {} seconds", .0.as_secs())]
    FloodWait(Duration),

    #[error("File is too large for the Bot API")]
    EntityTooLarge,

    #[error("Chat is not reachable: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Telegram API error: {0}")]
    Other(String),
}

impl From<RequestError> for TelegramError {
    fn from(err: RequestError) -> Self {
        let message = err.to_string();
        if is_too_large_message(&message) {
            return Self::EntityTooLarge;
        }

        match err {
            RequestError::RetryAfter(seconds) => Self::FloodWait(seconds.duration()),
            RequestError::Api(
                ApiError::BotBlocked
                | ApiError::BotKicked
                | ApiError::BotKickedFromSupergroup
                | ApiError::UserDeactivated
                | ApiError::CantInitiateConversation
                | ApiError::CantTalkWithBots,
            ) => Self::Forbidden(message),
            RequestError::Api(_) if message.to_lowercase().contains("forbidden") => {
                Self::Forbidden(message)
            }
            RequestError::Api(_) => Self::BadRequest(message),
            RequestError::Network(_) | RequestError::Io(_) => Self::Network(message),
            _ => Self::Other(message),
        }
    }
}

impl TelegramError {
    /// Returns whether the error says the uploaded file exceeds the upload limit.
    #[must_use]
    pub const fn is_too_large(&self) -> bool {
        matches!(self, Self::EntityTooLarge)
    }
}

fn is_too_large_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("too large") || lowered.contains("too big")
}

/// Database key for a Telegram user.
#[must_use]
pub fn user_key(id: UserId) -> i64 {
    i64::try_from(id.0).unwrap_or(i64::MAX)
}

/// Private chat with a stored user.
#[must_use]
pub const fn private_chat(user_id: i64) -> ChatId {
    ChatId(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_detection() {
        assert!(is_too_large_message("Request Entity Too Large"));
        assert!(is_too_large_message("Bad Request: file is too big"));
        assert!(!is_too_large_message("Bad Request: chat not found"));
    }

    #[test]
    fn test_blocked_bot_is_forbidden() {
        let err = TelegramError::from(RequestError::Api(ApiError::BotBlocked));
        assert!(matches!(err, TelegramError::Forbidden(_)));
    }

    #[test]
    fn test_other_api_errors_are_bad_requests() {
        let err = TelegramError::from(RequestError::Api(ApiError::ChatNotFound));
        assert!(matches!(err, TelegramError::BadRequest(_)));
        assert!(!err.is_too_large());
    }

    #[test]
    fn test_user_key() {
        assert_eq!(user_key(UserId(123_456_789)), 123_456_789);
        assert_eq!(private_chat(42), ChatId(42));
    }
}
