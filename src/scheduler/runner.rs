//! Profile badge scheduler.
//!
//! The badge is the bot's short description showing how many users were
//! active during the last 30 days. The loop:
//! 1. Wait for the next tick or a message
//! 2. Count monthly active users
//! 3. Publish only when the count changed since the last success

use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::storage::{Database, StorageError};
use crate::telegram::{Bot, TelegramError};

/// Messages that can be sent to the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerMessage {
    /// Refresh the badge now.
    TriggerUpdate,
    /// Stop the scheduler.
    Shutdown,
}

/// Errors raised while refreshing the badge.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Telegram(#[from] TelegramError),
}

/// What a refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeOutcome {
    /// The badge is turned off in the configuration.
    Disabled,
    /// The count did not change; nothing was sent.
    Unchanged(i64),
    /// A new short description was published.
    Updated(i64),
}

/// Short description for `count` monthly users.
#[must_use]
pub fn badge_text(count: i64) -> String {
    format!("👥 Oylik foydalanuvchilar: {count}")
}

/// Publishes the monthly-users badge.
#[derive(Debug)]
pub struct ProfileBadge {
    db: Database,
    enabled: bool,
    /// Count shown by the last successful update.
    last_published: Mutex<Option<i64>>,
}

impl ProfileBadge {
    #[must_use]
    pub fn new(db: Database, enabled: bool) -> Self {
        Self {
            db,
            enabled,
            last_published: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Decides whether `count` needs publishing.
    async fn pending_count(&self) -> Result<Option<i64>, StorageError> {
        let count = self.db.monthly_active_count().await?;
        let last = self.last_published.lock().await;
        Ok((*last != Some(count)).then_some(count))
    }

    /// Refreshes the badge through `bot`.
    pub async fn refresh(&self, bot: &Bot) -> Result<BadgeOutcome, SchedulerError> {
        if !self.enabled {
            return Ok(BadgeOutcome::Disabled);
        }

        let Some(count) = self.pending_count().await? else {
            let last = self.last_published.lock().await.unwrap_or_default();
            return Ok(BadgeOutcome::Unchanged(last));
        };

        bot.set_my_short_description()
            .short_description(badge_text(count))
            .await
            .map_err(TelegramError::from)?;

        *self.last_published.lock().await = Some(count);
        info!("Profile badge updated: {} monthly users", count);
        Ok(BadgeOutcome::Updated(count))
    }
}

/// Periodic badge refresher.
pub struct BadgeScheduler {
    bot: Bot,
    badge: Arc<ProfileBadge>,
    /// Time between refreshes.
    update_interval: Duration,
}

impl BadgeScheduler {
    /// Creates a new badge scheduler.
    #[must_use]
    pub fn new(bot: Bot, badge: Arc<ProfileBadge>, update_interval: Duration) -> Self {
        Self {
            bot,
            badge,
            update_interval,
        }
    }

    /// Runs the scheduler loop until [`SchedulerMessage::Shutdown`] or the
    /// sender is dropped.
    pub async fn run(&self, mut rx: mpsc::Receiver<SchedulerMessage>) {
        if !self.badge.is_enabled() {
            info!("Profile badge disabled");
        } else {
            info!(
                "Badge scheduler started (every {} seconds)",
                self.update_interval.as_secs()
            );
        }

        let mut timer = interval(self.update_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.tick().await;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(SchedulerMessage::TriggerUpdate) => {
                            debug!("Received trigger update message");
                            self.tick().await;
                        }
                        Some(SchedulerMessage::Shutdown) | None => {
                            info!("Scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Single tick of the scheduler.
    async fn tick(&self) {
        match self.badge.refresh(&self.bot).await {
            Ok(BadgeOutcome::Updated(_) | BadgeOutcome::Disabled) => {}
            Ok(BadgeOutcome::Unchanged(count)) => {
                debug!("Profile badge unchanged ({})", count);
            }
            Err(SchedulerError::Telegram(TelegramError::FloodWait(wait))) => {
                warn!("Flood wait from Telegram: {} seconds", wait.as_secs());
                // Retried on the next tick.
            }
            Err(e) => {
                error!("Failed to update profile badge: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for BadgeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BadgeScheduler")
            .field("update_interval", &self.update_interval)
            .finish_non_exhaustive()
    }
}
