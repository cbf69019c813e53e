//! Inline and reply keyboards.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};
use tracing::warn;
use url::Url;

use crate::commands::{AdminButton, CallbackAction};
use crate::storage::{AdminPermission, AdminPermissions, AdminRecord, Channel};

/// Channel labels longer than this are shortened on buttons.
const MAX_CHANNEL_LABEL_CHARS: usize = 25;

fn callback(text: impl Into<String>, action: &CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.data())
}

fn single_column(buttons: Vec<InlineKeyboardButton>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(buttons.into_iter().map(|b| vec![b]))
}

/// `🔙 Orqaga` leading to `action`.
fn back_button(action: &CallbackAction) -> InlineKeyboardButton {
    callback("🔙 Orqaga", action)
}

/// One join button per channel, then the re-check button.
///
/// Channels whose stored link is not a valid URL get no join button.
#[must_use]
pub fn subscription_keyboard(channels: &[Channel]) -> InlineKeyboardMarkup {
    let mut buttons: Vec<InlineKeyboardButton> = channels
        .iter()
        .filter_map(|channel| match Url::parse(&channel.link) {
            Ok(url) => Some(InlineKeyboardButton::url(format!("➕ {}", channel.label()), url)),
            Err(e) => {
                warn!("Channel {} has an unusable link: {}", channel.channel_id, e);
                None
            }
        })
        .collect();
    buttons.push(callback("✅ Tekshirish", &CallbackAction::CheckSubscription));
    single_column(buttons)
}

/// Persistent admin menu.
#[must_use]
pub fn admin_main_keyboard() -> KeyboardMarkup {
    let rows: Vec<Vec<KeyboardButton>> = AdminButton::ALL
        .chunks(2)
        .map(|pair| pair.iter().map(|b| KeyboardButton::new(b.label())).collect())
        .collect();
    KeyboardMarkup::new(rows).resize_keyboard()
}

/// Opens the detailed statistics view.
#[must_use]
pub fn stats_details_keyboard() -> InlineKeyboardMarkup {
    single_column(vec![callback("📈 Batafsil", &CallbackAction::Stats)])
}

/// Channel management actions. The first button flips mandatory subscription.
#[must_use]
pub fn channels_management_keyboard(subscription_enabled: bool) -> InlineKeyboardMarkup {
    let toggle = if subscription_enabled {
        "❌ Obunani o'chirish"
    } else {
        "✅ Obunani yoqish"
    };
    InlineKeyboardMarkup::new([
        vec![
            callback(toggle, &CallbackAction::ToggleSubscription),
            callback("📋 Kanallar ro'yxati", &CallbackAction::ChannelsList),
        ],
        vec![
            callback("➕ Kanal qo'shish", &CallbackAction::ChannelAdd),
            callback("🗑️ Kanal o'chirish", &CallbackAction::ChannelDelete),
        ],
        vec![callback(
            "📝 Obuna xabarini tahrirlash",
            &CallbackAction::EditSubscriptionText,
        )],
    ])
}

/// Shortens a channel label to fit on a button.
#[must_use]
pub fn short_label(label: &str) -> String {
    if label.chars().count() > MAX_CHANNEL_LABEL_CHARS {
        let head: String = label.chars().take(MAX_CHANNEL_LABEL_CHARS - 3).collect();
        format!("{head}...")
    } else {
        label.to_owned()
    }
}

/// One removal button per channel plus a back button.
#[must_use]
pub fn channels_list_keyboard(channels: &[Channel]) -> InlineKeyboardMarkup {
    let mut buttons: Vec<InlineKeyboardButton> = channels
        .iter()
        .map(|channel| {
            callback(
                format!("❌ {}", short_label(channel.label())),
                &CallbackAction::ChannelRemove(channel.channel_id.clone()),
            )
        })
        .collect();
    buttons.push(back_button(&CallbackAction::ChannelsBack));
    single_column(buttons)
}

/// Back to the channel management view.
#[must_use]
pub fn channels_back_keyboard() -> InlineKeyboardMarkup {
    single_column(vec![back_button(&CallbackAction::ChannelsBack)])
}

/// The admin management menu.
#[must_use]
pub fn admin_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![
            callback("📋 Adminlar ro'yxati", &CallbackAction::AdminsList),
            callback("➕ Admin qo'shish", &CallbackAction::AdminAdd),
        ],
        vec![
            callback("❌ Admin o'chirish", &CallbackAction::AdminRemoveSelect),
            callback("⚙️ Huquqlar", &CallbackAction::PermissionsSelect),
        ],
    ])
}

/// Back to the admin management menu.
#[must_use]
pub fn admin_menu_back_keyboard() -> InlineKeyboardMarkup {
    single_column(vec![back_button(&CallbackAction::BackToAdminMenu)])
}

/// Admins other than the main admin, each opening `action(user_id)`.
fn admin_picker(
    admins: &[AdminRecord],
    main_admin_id: i64,
    icon: &str,
    action: fn(i64) -> CallbackAction,
) -> InlineKeyboardMarkup {
    let mut buttons: Vec<InlineKeyboardButton> = admins
        .iter()
        .filter(|admin| admin.user_id != main_admin_id)
        .map(|admin| callback(format!("{icon} {}", admin.label()), &action(admin.user_id)))
        .collect();
    buttons.push(back_button(&CallbackAction::BackToAdminMenu));
    single_column(buttons)
}

/// Removal buttons for every admin except the main one.
#[must_use]
pub fn admin_remove_keyboard(admins: &[AdminRecord], main_admin_id: i64) -> InlineKeyboardMarkup {
    admin_picker(admins, main_admin_id, "❌", CallbackAction::AdminRemove)
}

/// Admin picker for permission editing.
#[must_use]
pub fn permission_admins_keyboard(
    admins: &[AdminRecord],
    main_admin_id: i64,
) -> InlineKeyboardMarkup {
    admin_picker(admins, main_admin_id, "👤", CallbackAction::PermissionManage)
}

/// One toggle button per permission of `user_id`.
#[must_use]
pub fn permission_toggle_keyboard(user_id: i64, permissions: &AdminPermissions) -> InlineKeyboardMarkup {
    let mut buttons: Vec<InlineKeyboardButton> = AdminPermission::ALL
        .into_iter()
        .map(|permission| {
            let granted = permissions.get(permission);
            let verb = if granted { "❌ O'chirish" } else { "✅ Yoqish" };
            callback(
                format!("{verb}: {}", permission.label()),
                &CallbackAction::PermissionToggle {
                    user_id,
                    permission,
                    enable: !granted,
                },
            )
        })
        .collect();
    buttons.push(back_button(&CallbackAction::PermissionsSelect));
    single_column(buttons)
}

/// Share-button settings.
#[must_use]
pub fn share_settings_keyboard(enabled: bool) -> InlineKeyboardMarkup {
    let toggle = if enabled {
        "✅ Tugmani o'chirish"
    } else {
        "▶️ Tugmani yoqish"
    };
    single_column(vec![
        callback(toggle, &CallbackAction::ShareToggle),
        callback("✏️ Matnni tahrirlash", &CallbackAction::ShareText),
        callback("🔗 Havolani tahrirlash", &CallbackAction::ShareUrl),
        back_button(&CallbackAction::ShareBack),
    ])
}

/// The button attached to delivered media, when its target is a valid URL.
#[must_use]
pub fn share_button(text: &str, url: &str) -> Option<InlineKeyboardMarkup> {
    let url = Url::parse(url.trim()).ok()?;
    Some(InlineKeyboardMarkup::new([[InlineKeyboardButton::url(
        text.trim(),
        url,
    )]]))
}

/// A single `❌ Bekor qilish` button.
#[must_use]
pub fn cancel_keyboard(action: &CallbackAction) -> InlineKeyboardMarkup {
    single_column(vec![callback("❌ Bekor qilish", action)])
}

/// Confirm, re-enter buttons, or cancel a prepared broadcast.
#[must_use]
pub fn broadcast_confirm_keyboard() -> InlineKeyboardMarkup {
    single_column(vec![
        callback("✅ Tasdiqlash", &CallbackAction::BroadcastConfirm),
        callback("♻️ Tugmalarni qayta kiritish", &CallbackAction::BroadcastRetry),
        callback("❌ Bekor qilish", &CallbackAction::BroadcastCancel),
    ])
}

#[cfg(test)]
mod tests {
    use teloxide::types::InlineKeyboardButtonKind;

    use super::*;

    fn callback_data(markup: &InlineKeyboardMarkup) -> Vec<String> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    fn channel(id: &str, title: Option<&str>, link: &str) -> Channel {
        Channel {
            channel_id: id.into(),
            title: title.map(Into::into),
            link: link.into(),
        }
    }

    #[test]
    fn test_subscription_keyboard_skips_bad_links() {
        let channels = [
            channel("-1001", Some("Yangiliklar"), "https://t.me/yangiliklar"),
            channel("-1002", None, "not a link"),
        ];
        let markup = subscription_keyboard(&channels);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0][0].text, "➕ Yangiliklar");
        assert_eq!(callback_data(&markup), vec!["check_subscription"]);
    }

    #[test]
    fn test_short_label() {
        assert_eq!(short_label("Qisqa"), "Qisqa");
        let long = "Juda uzun kanal nomi bu yerda turibdi";
        let short = short_label(long);
        assert_eq!(short.chars().count(), 25);
        assert!(short.ends_with("..."));
    }

    #[test]
    fn test_channels_list_keyboard() {
        let markup = channels_list_keyboard(&[channel("@kanal", None, "https://t.me/kanal")]);
        assert_eq!(
            callback_data(&markup),
            vec!["admin_channel_remove:@kanal", "admin_channels_back"]
        );
        assert_eq!(markup.inline_keyboard[0][0].text, "❌ https://t.me/kanal");
    }

    #[test]
    fn test_admin_pickers_skip_main_admin() {
        let admins = [
            AdminRecord {
                user_id: 1,
                username: Some("boss".into()),
            },
            AdminRecord {
                user_id: 2,
                username: None,
            },
        ];
        let markup = admin_remove_keyboard(&admins, 1);
        assert_eq!(
            callback_data(&markup),
            vec!["admin_remove:2", "admin_back_to_admin_menu"]
        );
        assert_eq!(markup.inline_keyboard[0][0].text, "❌ 2");

        let markup = permission_admins_keyboard(&admins, 1);
        assert_eq!(callback_data(&markup)[0], "admin_perm_manage:2");
    }

    #[test]
    fn test_permission_toggle_keyboard_flips_state() {
        let permissions = AdminPermissions {
            broadcast: true,
            ..AdminPermissions::default()
        };
        let data = callback_data(&permission_toggle_keyboard(5, &permissions));
        assert_eq!(data.len(), AdminPermission::ALL.len() + 1);
        assert!(data.contains(&"admin_perm_toggle:5:can_broadcast:0".to_owned()));
        assert!(data.contains(&"admin_perm_toggle:5:can_view_stats:1".to_owned()));
        assert_eq!(data.last().map(String::as_str), Some("admin_permissions_select"));
    }

    #[test]
    fn test_share_button() {
        assert!(share_button("♻️ Ulashish", "https://t.me/share/url").is_some());
        assert!(share_button("♻️ Ulashish", "").is_none());
    }

    #[test]
    fn test_admin_main_keyboard_has_every_button() {
        let markup = admin_main_keyboard();
        let count: usize = markup.keyboard.iter().map(Vec::len).sum();
        assert_eq!(count, AdminButton::ALL.len());
    }
}
