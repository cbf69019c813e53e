//! Admin-editable settings: their keys and factory values.

/// Greeting sent on `/start` once the user is subscribed.
pub const START_TEXT: &str = "start_text";

/// Prompt sent with the subscription keyboard.
pub const SUBSCRIBE_TEXT: &str = "subscribe_text";

/// Shown to admins when no mandatory channels are configured.
pub const NO_CHANNELS_TEXT: &str = "no_channels_text";

/// Whether mandatory subscription is enforced.
pub const SUBSCRIPTION_ENABLED: &str = "subscription_enabled";

/// Whether delivered media carries the share button.
pub const SHARE_BUTTON_ENABLED: &str = "share_button_enabled";

/// Label of the share button.
pub const SHARE_BUTTON_TEXT: &str = "share_button_text";

/// Target of the share button. Empty hides the button.
pub const SHARE_BUTTON_URL: &str = "share_button_url";

/// Settings inserted into a fresh database. Existing values are never overwritten.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    (
        START_TEXT,
        "Assalomu alaykum! Bu bot orqali Instagram va TikTok videolarini tez va sifatli yuklab olishingiz mumkin.",
    ),
    (
        SUBSCRIBE_TEXT,
        "Botdan foydalanish uchun quyidagi kanallarga obuna bo'ling va '✅ Tekshirish' tugmasini bosing.",
    ),
    (NO_CHANNELS_TEXT, "Hozircha majburiy obuna kanallari yo'q."),
    (SHARE_BUTTON_ENABLED, "1"),
    (SHARE_BUTTON_TEXT, "♻️ Do'stlarga ulashish"),
    (SHARE_BUTTON_URL, "https://t.me/share/url"),
];

/// Returns the factory value for a setting.
///
/// `subscription_enabled` is not seeded but defaults to on.
#[must_use]
pub fn default_setting(key: &str) -> Option<&'static str> {
    if key == SUBSCRIPTION_ENABLED {
        return Some("1");
    }
    DEFAULT_SETTINGS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

/// Interprets a stored flag the way admins tend to write it.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "ha" | "yes" | "on" | "enabled"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_values() {
        for value in ["1", "true", "HA", " yes ", "On", "enabled"] {
            assert!(is_truthy(value), "{value} should be truthy");
        }
        for value in ["0", "false", "yo'q", "", "off"] {
            assert!(!is_truthy(value), "{value} should be falsy");
        }
    }

    #[test]
    fn test_default_setting_lookup() {
        assert_eq!(default_setting(SHARE_BUTTON_ENABLED), Some("1"));
        assert_eq!(default_setting(SUBSCRIPTION_ENABLED), Some("1"));
        assert_eq!(default_setting("unknown"), None);
    }
}
