//! Telegram Bot API plumbing.
//!
//! Provides the bot handle, error classification, keyboard builders and
//! the rate limiter used for bulk sends.

mod client;
pub mod keyboards;
mod rate_limiter;

pub use client::{Bot, TelegramError, build_bot, private_chat, user_key};
pub use rate_limiter::{BROADCAST_INTERVAL, RateLimiter};
