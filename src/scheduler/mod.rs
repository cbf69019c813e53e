//! Background jobs.
//!
//! Keeps the bot's short description in sync with the number of monthly
//! active users.

mod runner;

pub use runner::{BadgeOutcome, BadgeScheduler, ProfileBadge, SchedulerError, SchedulerMessage, badge_text};
