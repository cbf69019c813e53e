//! Mandatory channel subscription.

use std::future::Future;

use teloxide::prelude::*;
use teloxide::types::{Recipient, UserId};
use tracing::{error, warn};

use crate::config::defaults::SUBSCRIPTION_ENABLED;
use crate::config::is_truthy;
use crate::storage::{Channel, Database, StorageError};
use crate::telegram::{Bot, TelegramError};

/// Answers "is this user in that channel?".
pub trait MembershipLookup {
    /// `Ok(false)` when the user left or was banned.
    fn is_member(
        &self,
        channel_id: &str,
        user_id: i64,
    ) -> impl Future<Output = Result<bool, TelegramError>> + Send;
}

/// Stored channel ids are either numeric chat ids or `@usernames`.
#[must_use]
pub fn channel_recipient(channel_id: &str) -> Recipient {
    match channel_id.trim().parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(channel_id.trim().to_owned()),
    }
}

impl MembershipLookup for Bot {
    async fn is_member(&self, channel_id: &str, user_id: i64) -> Result<bool, TelegramError> {
        let user = UserId(u64::try_from(user_id).unwrap_or_default());
        let member = self
            .get_chat_member(channel_recipient(channel_id), user)
            .await?;
        Ok(!(member.kind.is_left() || member.kind.is_banned()))
    }
}

/// Outcome of a subscription check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionStatus {
    pub allowed: bool,
    /// Channels the user still has to join.
    pub missing: Vec<Channel>,
}

impl SubscriptionStatus {
    fn allowed() -> Self {
        Self {
            allowed: true,
            missing: Vec::new(),
        }
    }
}

/// Checks `user_id` against every mandatory channel.
///
/// Nothing is required while the `subscription_enabled` setting is off or no
/// channel is configured. A channel the bot cannot inspect counts as missing.
pub async fn ensure_user_subscription<L: MembershipLookup>(
    lookup: &L,
    db: &Database,
    user_id: i64,
) -> Result<SubscriptionStatus, StorageError> {
    if !is_truthy(&db.setting_or_default(SUBSCRIPTION_ENABLED).await?) {
        return Ok(SubscriptionStatus::allowed());
    }

    let channels = db.channels().await?;
    if channels.is_empty() {
        return Ok(SubscriptionStatus::allowed());
    }

    let mut missing = Vec::new();
    for channel in channels {
        match lookup.is_member(&channel.channel_id, user_id).await {
            Ok(true) => {}
            Ok(false) => missing.push(channel),
            Err(TelegramError::Forbidden(e)) => {
                warn!("Bot is not a member of channel {}: {}", channel.channel_id, e);
                missing.push(channel);
            }
            Err(e) => {
                error!("Channel {} is not reachable: {}", channel.channel_id, e);
                missing.push(channel);
            }
        }
    }

    Ok(SubscriptionStatus {
        allowed: missing.is_empty(),
        missing,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Membership answers keyed by channel id. Absent channels fail the lookup.
    struct FakeLookup(HashMap<&'static str, bool>);

    impl MembershipLookup for FakeLookup {
        async fn is_member(&self, channel_id: &str, _user_id: i64) -> Result<bool, TelegramError> {
            self.0
                .get(channel_id)
                .copied()
                .ok_or_else(|| TelegramError::BadRequest("chat not found".into()))
        }
    }

    async fn database() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("bot.db")).await.unwrap();
        (dir, db)
    }

    #[test]
    fn test_channel_recipient() {
        assert_eq!(channel_recipient("-1001234"), Recipient::Id(ChatId(-1_001_234)));
        assert_eq!(
            channel_recipient("@kanal"),
            Recipient::ChannelUsername("@kanal".into())
        );
    }

    #[tokio::test]
    async fn test_no_channels_means_allowed() {
        let (_dir, db) = database().await;
        let status = ensure_user_subscription(&FakeLookup(HashMap::new()), &db, 1)
            .await
            .unwrap();
        assert!(status.allowed);
    }

    #[tokio::test]
    async fn test_missing_and_unreachable_channels() {
        let (_dir, db) = database().await;
        db.add_channel("-1001", "A", "https://t.me/a").await.unwrap();
        db.add_channel("-1002", "B", "https://t.me/b").await.unwrap();
        db.add_channel("-1003", "C", "https://t.me/c").await.unwrap();

        let lookup = FakeLookup(HashMap::from([("-1001", true), ("-1002", false)]));
        let status = ensure_user_subscription(&lookup, &db, 1).await.unwrap();

        assert!(!status.allowed);
        let missing: Vec<_> = status.missing.iter().map(|c| c.channel_id.as_str()).collect();
        assert_eq!(missing, vec!["-1002", "-1003"]);
    }

    #[tokio::test]
    async fn test_disabled_subscription_skips_checks() {
        let (_dir, db) = database().await;
        db.add_channel("-1001", "A", "https://t.me/a").await.unwrap();
        db.set_setting(SUBSCRIPTION_ENABLED, "0").await.unwrap();

        let status = ensure_user_subscription(&FakeLookup(HashMap::new()), &db, 1)
            .await
            .unwrap();
        assert!(status.allowed);
        assert!(status.missing.is_empty());
    }
}
