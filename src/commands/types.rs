//! Command types and definitions.

use std::fmt;

use teloxide::utils::command::BotCommands;

use crate::storage::AdminPermission;

/// Slash commands understood by the bot.
#[derive(BotCommands, Debug, Clone, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Mavjud buyruqlar:")]
pub enum BotCommand {
    #[command(description = "botni ishga tushirish")]
    Start,
    #[command(description = "admin panel")]
    Admin,
    #[command(description = "ma'lumotlar zaxirasi")]
    Backup,
    #[command(description = "bot holati")]
    Ping,
    #[command(description = "ishlash vaqti")]
    Uptime,
}

/// Buttons of the admin reply keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminButton {
    Stats,
    Channels,
    Admins,
    Broadcast,
    EditStartText,
    ShareButton,
    MonthlyUsers,
    Logs,
    Backup,
    Uptime,
    SelfTest,
    Back,
}

impl AdminButton {
    /// Every button, in keyboard order.
    pub const ALL: [Self; 12] = [
        Self::Stats,
        Self::Channels,
        Self::Admins,
        Self::Broadcast,
        Self::EditStartText,
        Self::ShareButton,
        Self::MonthlyUsers,
        Self::Logs,
        Self::Backup,
        Self::Uptime,
        Self::SelfTest,
        Self::Back,
    ];

    /// Button caption as shown on the keyboard.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stats => "📊 Statistika",
            Self::Channels => "📢 Kanal boshqaruvi",
            Self::Admins => "👑 Admin boshqaruvi",
            Self::Broadcast => "📨 Xabar yuborish",
            Self::EditStartText => "📝 Start xabarini tahrirlash",
            Self::ShareButton => "🔗 Ulashish tugmasi",
            Self::MonthlyUsers => "🗓 Oylik foydalanuvchilar",
            Self::Logs => "📜 Loglar",
            Self::Backup => "📂 Backup",
            Self::Uptime => "🕒 Uptime",
            Self::SelfTest => "🧪 Test",
            Self::Back => "🔙 Ortga",
        }
    }

    /// Matches a message text against the keyboard.
    ///
    /// Older keyboards sent `👥 Adminlar`, and any text mentioning
    /// `Kanal boshqaruvi` opens the channel view.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "👥 Adminlar" {
            return Some(Self::Admins);
        }
        if let Some(button) = Self::ALL.into_iter().find(|b| b.label() == text) {
            return Some(button);
        }
        text.contains("Kanal boshqaruvi").then_some(Self::Channels)
    }
}

impl fmt::Display for AdminButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inline button payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    CheckSubscription,

    Stats,
    ManageChannels,
    ToggleSubscription,
    ChannelsList,
    ChannelsBack,
    ChannelDelete,
    ChannelRemove(String),
    ChannelAdd,
    EditSubscriptionText,
    EditSubscriptionCancel,
    EditStartCancel,

    ShareToggle,
    ShareText,
    ShareTextCancel,
    ShareUrl,
    ShareUrlCancel,
    ShareBack,

    AdminsList,
    AdminAdd,
    AdminRemoveSelect,
    AdminRemove(i64),
    PermissionsSelect,
    PermissionManage(i64),
    PermissionToggle {
        user_id: i64,
        permission: AdminPermission,
        enable: bool,
    },
    BackToAdminMenu,

    BroadcastConfirm,
    BroadcastRetry,
    BroadcastCancel,
}

impl CallbackAction {
    /// Parses callback data. Returns `None` for unknown or malformed payloads.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        if let Some((kind, rest)) = data.split_once(':') {
            return Self::parse_parameterised(kind, rest);
        }

        let action = match data {
            "check_subscription" => Self::CheckSubscription,
            "admin_stats" => Self::Stats,
            "admin_channels" | "admin_manage_channels" => Self::ManageChannels,
            "admin_disable_subscription" => Self::ToggleSubscription,
            "admin_channels_list" => Self::ChannelsList,
            "admin_channels_back" => Self::ChannelsBack,
            "admin_channel_delete" => Self::ChannelDelete,
            "admin_channel_add" => Self::ChannelAdd,
            "admin_edit_subscription_text" => Self::EditSubscriptionText,
            "admin_edit_subscription_cancel" => Self::EditSubscriptionCancel,
            "admin_edit_start_cancel" => Self::EditStartCancel,
            "admin_share_toggle" => Self::ShareToggle,
            "admin_share_text" => Self::ShareText,
            "admin_share_text_cancel" => Self::ShareTextCancel,
            "admin_share_url" => Self::ShareUrl,
            "admin_share_url_cancel" => Self::ShareUrlCancel,
            "admin_share_back" => Self::ShareBack,
            "admin_admins_list" => Self::AdminsList,
            "admin_add" => Self::AdminAdd,
            "admin_remove_select" => Self::AdminRemoveSelect,
            "admin_permissions_select" => Self::PermissionsSelect,
            "admin_back_to_admin_menu" => Self::BackToAdminMenu,
            "admin_broadcast_confirm" => Self::BroadcastConfirm,
            "admin_broadcast_retry" => Self::BroadcastRetry,
            "admin_broadcast_cancel" => Self::BroadcastCancel,
            _ => return None,
        };
        Some(action)
    }

    fn parse_parameterised(kind: &str, rest: &str) -> Option<Self> {
        match kind {
            "admin_channel_remove" => {
                let channel_id = rest.trim();
                (!channel_id.is_empty()).then(|| Self::ChannelRemove(channel_id.to_owned()))
            }
            "admin_remove" => parse_user_id(rest).map(Self::AdminRemove),
            "admin_perm_manage" => parse_user_id(rest).map(Self::PermissionManage),
            "admin_perm_toggle" => {
                let mut parts = rest.split(':');
                let user_id = parse_user_id(parts.next()?)?;
                let permission = parts.next()?.parse().ok()?;
                let enable = match parts.next()? {
                    "1" => true,
                    "0" => false,
                    _ => return None,
                };
                if parts.next().is_some() {
                    return None;
                }
                Some(Self::PermissionToggle {
                    user_id,
                    permission,
                    enable,
                })
            }
            _ => None,
        }
    }

    /// Serialized payload, the inverse of [`CallbackAction::parse`].
    #[must_use]
    pub fn data(&self) -> String {
        self.to_string()
    }
}

fn parse_user_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fixed = match self {
            Self::ChannelRemove(id) => return write!(f, "admin_channel_remove:{id}"),
            Self::AdminRemove(id) => return write!(f, "admin_remove:{id}"),
            Self::PermissionManage(id) => return write!(f, "admin_perm_manage:{id}"),
            Self::PermissionToggle {
                user_id,
                permission,
                enable,
            } => {
                return write!(
                    f,
                    "admin_perm_toggle:{user_id}:{}:{}",
                    permission.column(),
                    u8::from(*enable)
                );
            }
            Self::CheckSubscription => "check_subscription",
            Self::Stats => "admin_stats",
            Self::ManageChannels => "admin_manage_channels",
            Self::ToggleSubscription => "admin_disable_subscription",
            Self::ChannelsList => "admin_channels_list",
            Self::ChannelsBack => "admin_channels_back",
            Self::ChannelDelete => "admin_channel_delete",
            Self::ChannelAdd => "admin_channel_add",
            Self::EditSubscriptionText => "admin_edit_subscription_text",
            Self::EditSubscriptionCancel => "admin_edit_subscription_cancel",
            Self::EditStartCancel => "admin_edit_start_cancel",
            Self::ShareToggle => "admin_share_toggle",
            Self::ShareText => "admin_share_text",
            Self::ShareTextCancel => "admin_share_text_cancel",
            Self::ShareUrl => "admin_share_url",
            Self::ShareUrlCancel => "admin_share_url_cancel",
            Self::ShareBack => "admin_share_back",
            Self::AdminsList => "admin_admins_list",
            Self::AdminAdd => "admin_add",
            Self::AdminRemoveSelect => "admin_remove_select",
            Self::PermissionsSelect => "admin_permissions_select",
            Self::BackToAdminMenu => "admin_back_to_admin_menu",
            Self::BroadcastConfirm => "admin_broadcast_confirm",
            Self::BroadcastRetry => "admin_broadcast_retry",
            Self::BroadcastCancel => "admin_broadcast_cancel",
        };
        f.write_str(fixed)
    }
}

/// Words that abort an admin dialogue.
#[must_use]
pub fn is_cancel_word(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "bekor" | "cancel")
}

/// Validates a share-button target.
///
/// `http://`, `https://` and `tg://` links pass through, bare `t.me/…`
/// gains `https://`, anything else is rejected.
#[must_use]
pub fn normalize_button_url(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if ["http://", "https://", "tg://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
    {
        return Some(value.to_owned());
    }
    value
        .starts_with("t.me/")
        .then(|| format!("https://{value}"))
}

/// Turns a channel link, `@name` or bare name into a `getChat` identifier.
///
/// Query strings are dropped. Numeric `-100…` ids are kept as they are.
#[must_use]
pub fn normalize_channel_lookup(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("tg://resolve?domain=").unwrap_or(raw);
    let cleaned = raw.split(['?', '&']).next().unwrap_or_default().trim();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.starts_with("-100") {
        return Some(cleaned.to_owned());
    }

    let name = ["https://t.me/", "http://t.me/", "t.me/"]
        .iter()
        .find_map(|prefix| cleaned.strip_prefix(prefix))
        .unwrap_or(cleaned)
        .trim_start_matches('@')
        .trim_end_matches('/');

    (!name.is_empty()).then(|| format!("@{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash_commands() {
        assert!(matches!(BotCommand::parse("/start", "saver_bot"), Ok(BotCommand::Start)));
        assert!(matches!(BotCommand::parse("/admin", "saver_bot"), Ok(BotCommand::Admin)));
        assert!(matches!(
            BotCommand::parse("/uptime@saver_bot", "saver_bot"),
            Ok(BotCommand::Uptime)
        ));
        assert!(BotCommand::parse("/unknown", "saver_bot").is_err());
    }

    #[test]
    fn test_admin_button_labels_round_trip() {
        for button in AdminButton::ALL {
            assert_eq!(AdminButton::parse(button.label()), Some(button));
        }
    }

    #[test]
    fn test_admin_button_aliases() {
        assert_eq!(AdminButton::parse("👥 Adminlar"), Some(AdminButton::Admins));
        assert_eq!(
            AdminButton::parse("Kanal boshqaruvi"),
            Some(AdminButton::Channels)
        );
        assert_eq!(AdminButton::parse("salom"), None);
    }

    #[test]
    fn test_callback_fixed_payloads() {
        assert_eq!(
            CallbackAction::parse("check_subscription"),
            Some(CallbackAction::CheckSubscription)
        );
        assert_eq!(
            CallbackAction::parse("admin_channels"),
            Some(CallbackAction::ManageChannels)
        );
        assert_eq!(
            CallbackAction::parse("admin_broadcast_retry"),
            Some(CallbackAction::BroadcastRetry)
        );
        assert_eq!(CallbackAction::parse("something_else"), None);
    }

    #[test]
    fn test_callback_parameterised_payloads() {
        assert_eq!(
            CallbackAction::parse("admin_channel_remove:-1001234"),
            Some(CallbackAction::ChannelRemove("-1001234".into()))
        );
        assert_eq!(
            CallbackAction::parse("admin_remove:42"),
            Some(CallbackAction::AdminRemove(42))
        );
        assert_eq!(
            CallbackAction::parse("admin_perm_toggle:42:can_broadcast:1"),
            Some(CallbackAction::PermissionToggle {
                user_id: 42,
                permission: AdminPermission::Broadcast,
                enable: true,
            })
        );
    }

    #[test]
    fn test_callback_rejects_malformed_parameters() {
        assert_eq!(CallbackAction::parse("admin_channel_remove:"), None);
        assert_eq!(CallbackAction::parse("admin_remove:abc"), None);
        assert_eq!(CallbackAction::parse("admin_remove:-5"), None);
        assert_eq!(CallbackAction::parse("admin_perm_manage:"), None);
        assert_eq!(CallbackAction::parse("admin_perm_toggle:42:can_fly:1"), None);
        assert_eq!(CallbackAction::parse("admin_perm_toggle:42:can_broadcast:2"), None);
        assert_eq!(CallbackAction::parse("admin_perm_toggle:42:can_broadcast"), None);
    }

    #[test]
    fn test_callback_data_is_parseable() {
        let actions = [
            CallbackAction::ChannelRemove("@kanal".into()),
            CallbackAction::PermissionManage(7),
            CallbackAction::PermissionToggle {
                user_id: 7,
                permission: AdminPermission::ViewStats,
                enable: false,
            },
            CallbackAction::ShareUrlCancel,
        ];
        for action in actions {
            assert_eq!(CallbackAction::parse(&action.data()), Some(action));
        }
    }

    #[test]
    fn test_cancel_words() {
        assert!(is_cancel_word("Bekor"));
        assert!(is_cancel_word(" cancel "));
        assert!(!is_cancel_word("bekor qilish"));
    }

    #[test]
    fn test_normalize_button_url() {
        assert_eq!(
            normalize_button_url(" https://t.me/share/url "),
            Some("https://t.me/share/url".into())
        );
        assert_eq!(normalize_button_url("tg://resolve?domain=x"), Some("tg://resolve?domain=x".into()));
        assert_eq!(normalize_button_url("t.me/kanal"), Some("https://t.me/kanal".into()));
        assert_eq!(normalize_button_url("kanal"), None);
        assert_eq!(normalize_button_url("   "), None);
    }

    #[test]
    fn test_normalize_channel_lookup() {
        assert_eq!(normalize_channel_lookup("https://t.me/kanal"), Some("@kanal".into()));
        assert_eq!(normalize_channel_lookup("t.me/kanal?start=1"), Some("@kanal".into()));
        assert_eq!(normalize_channel_lookup("@kanal"), Some("@kanal".into()));
        assert_eq!(normalize_channel_lookup("kanal"), Some("@kanal".into()));
        assert_eq!(normalize_channel_lookup("-1001234567"), Some("-1001234567".into()));
        assert_eq!(
            normalize_channel_lookup("tg://resolve?domain=kanal&post=3"),
            Some("@kanal".into())
        );
        assert_eq!(normalize_channel_lookup(""), None);
    }
}
