//! Admin-editable texts and the share button.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;
use v_htmlescape::escape;

use super::{
    AppState, BotDialogue, HandlerResult, MessageRef, State, answer, callback_target,
    callback_user, delete_quietly, edit_or_send, send_with_markup,
};
use crate::commands::{CallbackAction, is_cancel_word, normalize_button_url};
use crate::config::defaults::{
    SHARE_BUTTON_ENABLED, SHARE_BUTTON_TEXT, SHARE_BUTTON_URL, START_TEXT, SUBSCRIBE_TEXT,
};
use crate::config::{default_setting, is_truthy};
use crate::storage::{Database, StorageError};
use crate::telegram::keyboards::{cancel_keyboard, share_settings_keyboard};
use crate::telegram::{Bot, user_key};

/// Longest share button label accepted.
const MAX_SHARE_TEXT_CHARS: usize = 64;

const RESET_WORDS: &[&str] = &["default", "standart"];
const CLEAR_WORDS: &[&str] = &["o'chirish", "ochirish", "off", "0"];

// ----------------------------------------------------------------------
// Start and subscription texts
// ----------------------------------------------------------------------

/// One of the two long texts admins can replace.
#[derive(Debug)]
struct EditableText {
    key: &'static str,
    state: State,
    title: &'static str,
    cancel: CallbackAction,
    saved: &'static str,
    log_action: &'static str,
}

const START: EditableText = EditableText {
    key: START_TEXT,
    state: State::StartText,
    title: "📝 <b>Start xabarini tahrirlash</b>",
    cancel: CallbackAction::EditStartCancel,
    saved: "✅ Xush kelibsiz matni yangilandi.",
    log_action: "start_text_update",
};

const SUBSCRIBE: EditableText = EditableText {
    key: SUBSCRIBE_TEXT,
    state: State::SubscriptionText,
    title: "🔔 <b>Obuna talabi xabarini tahrirlash</b>",
    cancel: CallbackAction::EditSubscriptionCancel,
    saved: "✅ Obuna talabi xabari yangilandi.",
    log_action: "subscribe_text_update",
};

fn text_prompt(title: &str, current: &str) -> String {
    format!(
        "{title}\n\n\
         <b>Amaldagi matn:</b>\n<pre>{}</pre>\n\n\
         ✏️ Yangi matnni shu yerga yuboring.\n\
         ℹ️ HTML teglari (&lt;b&gt;, &lt;i&gt;, &lt;code&gt; va boshqalar) ishlatishingiz mumkin.\n\
         ❗ Bekor qilish uchun pastdagi tugmani bosing yoki 'Bekor' deb yozing.",
        escape(current)
    )
}

async fn prompt_text_edit(
    bot: &Bot,
    chat: ChatId,
    dialogue: &BotDialogue,
    db: &Database,
    text: &EditableText,
) -> HandlerResult {
    let current = db.setting_or_default(text.key).await?;
    dialogue.update(text.state.clone()).await?;
    send_with_markup(
        bot,
        chat,
        &text_prompt(text.title, &current),
        Some(cancel_keyboard(&text.cancel)),
    )
    .await
}

pub(super) async fn start_start_text(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    prompt_text_edit(&bot, msg.chat.id, &dialogue, &app.db, &START).await
}

pub(super) async fn start_subscription_text(
    bot: Bot,
    q: CallbackQuery,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let Some((chat, id)) = callback_target(&q) else {
        return Ok(());
    };
    delete_quietly(&bot, MessageRef { chat, id }).await;
    prompt_text_edit(&bot, chat, &dialogue, &app.db, &SUBSCRIBE).await
}

async fn save_text(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    app: Arc<AppState>,
    text: &EditableText,
) -> HandlerResult {
    if !super::admin::ensure_admin_message(&bot, &msg, &app).await? {
        dialogue.exit().await?;
        return Ok(());
    }
    let value = msg.text().unwrap_or_default().trim();
    if is_cancel_word(value) {
        dialogue.exit().await?;
        bot.send_message(msg.chat.id, "O'zgarishlar bekor qilindi.").await?;
        return Ok(());
    }
    if value.is_empty() {
        bot.send_message(msg.chat.id, "Matn bo'sh bo'lmasligi kerak.").await?;
        return Ok(());
    }

    app.db.set_setting(text.key, value).await?;
    app.db
        .add_log(msg.from.as_ref().map(|u| user_key(u.id)), text.log_action)
        .await?;
    info!("Setting {} updated", text.key);
    dialogue.exit().await?;
    bot.send_message(msg.chat.id, text.saved).await?;
    Ok(())
}

pub(super) async fn receive_start_text(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    save_text(bot, msg, dialogue, app, &START).await
}

pub(super) async fn receive_subscription_text(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    save_text(bot, msg, dialogue, app, &SUBSCRIBE).await
}

// ----------------------------------------------------------------------
// Share button
// ----------------------------------------------------------------------

/// Stored share button settings.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ShareSettings {
    enabled: bool,
    text: String,
    url: String,
}

impl ShareSettings {
    async fn load(db: &Database) -> Result<Self, StorageError> {
        Ok(Self {
            enabled: is_truthy(&db.setting_or_default(SHARE_BUTTON_ENABLED).await?),
            text: db.setting_or_default(SHARE_BUTTON_TEXT).await?,
            url: db.setting_or_default(SHARE_BUTTON_URL).await?,
        })
    }

    fn render(&self) -> String {
        let status = if self.enabled {
            "✅ Yoqilgan"
        } else {
            "❌ O'chirilgan"
        };
        let text = if self.text.is_empty() {
            "<i>Matn kiritilmagan</i>".to_owned()
        } else {
            escape(&self.text).to_string()
        };
        let url = if self.url.is_empty() {
            "<i>Havola kiritilmagan</i>".to_owned()
        } else {
            let url = escape(&self.url);
            format!("<a href=\"{url}\">{url}</a>")
        };
        format!(
            "🔗 <b>Ulashish tugmasi sozlamalari</b>\n\n\
             Holati: {status}\n\
             Matn: {text}\n\
             Havola: {url}\n\n\
             ✏️ Pastdagi tugmalar orqali matn, havola yoki holatini o'zgartiring."
        )
    }
}

pub(super) async fn send_share_overview(bot: &Bot, chat: ChatId, app: &AppState) -> HandlerResult {
    let settings = ShareSettings::load(&app.db).await?;
    send_with_markup(
        bot,
        chat,
        &settings.render(),
        Some(share_settings_keyboard(settings.enabled)),
    )
    .await
}

pub(super) async fn toggle_share(bot: Bot, q: CallbackQuery, app: Arc<AppState>) -> HandlerResult {
    let mut settings = ShareSettings::load(&app.db).await?;
    settings.enabled = !settings.enabled;
    let flag = if settings.enabled { "1" } else { "0" };
    app.db.set_setting(SHARE_BUTTON_ENABLED, flag).await?;
    app.db
        .add_log(
            Some(callback_user(&q)),
            &format!("share_button_toggle:{flag}"),
        )
        .await?;

    let status = if settings.enabled {
        "Tugma yoqildi ✅."
    } else {
        "Tugma o'chirildi ❌."
    };
    answer(&bot, &q, status, true).await?;
    if let Some(target) = callback_target(&q) {
        edit_or_send(
            &bot,
            target,
            &settings.render(),
            Some(share_settings_keyboard(settings.enabled)),
        )
        .await?;
    }
    Ok(())
}

pub(super) async fn start_share_text(
    bot: Bot,
    q: CallbackQuery,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    dialogue.update(State::ShareButtonText).await?;
    bot.answer_callback_query(q.id.clone()).await?;
    let current = app.db.setting_or_default(SHARE_BUTTON_TEXT).await?;
    let shown = if current.is_empty() {
        "---".to_owned()
    } else {
        escape(&current).to_string()
    };
    if let Some((chat, _)) = callback_target(&q) {
        send_with_markup(
            &bot,
            chat,
            &format!(
                "✏️ <b>Tugma matnini tahrirlash</b>\n\n\
                 Amaldagi matn:\n<pre>{shown}</pre>\n\n\
                 Yangi matnni yuboring ({MAX_SHARE_TEXT_CHARS} ta belgigacha).\n\
                 ➡️ Standart matnga qaytish uchun <code>default</code> deb yozing."
            ),
            Some(cancel_keyboard(&CallbackAction::ShareTextCancel)),
        )
        .await?;
    }
    Ok(())
}

pub(super) async fn start_share_url(
    bot: Bot,
    q: CallbackQuery,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    dialogue.update(State::ShareButtonUrl).await?;
    bot.answer_callback_query(q.id.clone()).await?;
    let current = app.db.setting_or_default(SHARE_BUTTON_URL).await?;
    let shown = if current.is_empty() {
        "<i>Havola kiritilmagan</i>".to_owned()
    } else {
        escape(&current).to_string()
    };
    if let Some((chat, _)) = callback_target(&q) {
        send_with_markup(
            &bot,
            chat,
            &format!(
                "🔗 <b>Tugma havolasini tahrirlash</b>\n\n\
                 Amaldagi havola: {shown}\n\n\
                 Yangi havolani yuboring (http/https/tg://).\n\
                 ➡️ Havolani o'chirish uchun <code>o'chirish</code> deb yozing."
            ),
            Some(cancel_keyboard(&CallbackAction::ShareUrlCancel)),
        )
        .await?;
    }
    Ok(())
}

/// Leaves a share edit dialogue and shows the settings again.
pub(super) async fn cancel_share_edit(
    bot: Bot,
    q: CallbackQuery,
    dialogue: BotDialogue,
    app: Arc<AppState>,
    text: &str,
) -> HandlerResult {
    dialogue.exit().await?;
    answer(&bot, &q, "Bekor qilindi.", false).await?;
    if let Some(target) = callback_target(&q) {
        edit_or_send(&bot, target, text, None).await?;
        send_share_overview(&bot, target.0, &app).await?;
    }
    Ok(())
}

pub(super) async fn close_share(bot: Bot, q: CallbackQuery) -> HandlerResult {
    answer(&bot, &q, "Sozlamalar yopildi.", false).await?;
    if let Some((chat, id)) = callback_target(&q)
        && bot.delete_message(chat, id).await.is_err()
    {
        edit_or_send(&bot, (chat, id), "🔗 Ulashish tugmasi sozlamalari yopildi.", None).await?;
    }
    Ok(())
}

/// What the admin asked for while editing the share button label.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ShareTextEdit {
    Cancel,
    Set(String),
    Empty,
    TooLong,
}

fn parse_share_text(raw: &str) -> ShareTextEdit {
    let value = raw.trim();
    let lower = value.to_lowercase();
    if is_cancel_word(value) {
        return ShareTextEdit::Cancel;
    }
    if RESET_WORDS.contains(&lower.as_str()) {
        let default = default_setting(SHARE_BUTTON_TEXT).unwrap_or_default();
        return ShareTextEdit::Set(default.to_owned());
    }
    if value.is_empty() {
        ShareTextEdit::Empty
    } else if value.chars().count() > MAX_SHARE_TEXT_CHARS {
        ShareTextEdit::TooLong
    } else {
        ShareTextEdit::Set(value.to_owned())
    }
}

/// What the admin asked for while editing the share button target.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ShareUrlEdit {
    Cancel,
    Clear,
    Set(String),
    Invalid,
}

fn parse_share_url(raw: &str) -> ShareUrlEdit {
    let value = raw.trim();
    if is_cancel_word(value) {
        return ShareUrlEdit::Cancel;
    }
    if CLEAR_WORDS.contains(&value.to_lowercase().as_str()) {
        return ShareUrlEdit::Clear;
    }
    normalize_button_url(value).map_or(ShareUrlEdit::Invalid, ShareUrlEdit::Set)
}

pub(super) async fn receive_share_text(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    if !super::admin::ensure_admin_message(&bot, &msg, &app).await? {
        dialogue.exit().await?;
        return Ok(());
    }
    let chat = msg.chat.id;
    match parse_share_text(msg.text().unwrap_or_default()) {
        ShareTextEdit::Cancel => {
            dialogue.exit().await?;
            bot.send_message(chat, "O'zgarishlar bekor qilindi.").await?;
            return Ok(());
        }
        ShareTextEdit::Empty => {
            bot.send_message(chat, "Matn bo'sh bo'lmasligi kerak.").await?;
            return Ok(());
        }
        ShareTextEdit::TooLong => {
            bot.send_message(chat, "Matn uzunligi 64 belgidan oshmasligi kerak.")
                .await?;
            return Ok(());
        }
        ShareTextEdit::Set(text) => {
            app.db.set_setting(SHARE_BUTTON_TEXT, &text).await?;
            app.db
                .add_log(
                    msg.from.as_ref().map(|u| user_key(u.id)),
                    "share_button_text_update",
                )
                .await?;
            dialogue.exit().await?;
            bot.send_message(chat, "✅ Tugma matni yangilandi.").await?;
        }
    }
    send_share_overview(&bot, chat, &app).await
}

pub(super) async fn receive_share_url(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    if !super::admin::ensure_admin_message(&bot, &msg, &app).await? {
        dialogue.exit().await?;
        return Ok(());
    }
    let chat = msg.chat.id;
    let admin = msg.from.as_ref().map(|u| user_key(u.id));
    match parse_share_url(msg.text().unwrap_or_default()) {
        ShareUrlEdit::Cancel => {
            dialogue.exit().await?;
            bot.send_message(chat, "O'zgarishlar bekor qilindi.").await?;
            return Ok(());
        }
        ShareUrlEdit::Invalid => {
            bot.send_message(
                chat,
                "❌ Havola noto'g'ri. U http://, https:// yoki tg:// bilan boshlanishi kerak.",
            )
            .await?;
            return Ok(());
        }
        ShareUrlEdit::Clear => {
            app.db.set_setting(SHARE_BUTTON_URL, "").await?;
            app.db.add_log(admin, "share_button_url_cleared").await?;
            dialogue.exit().await?;
            bot.send_message(chat, "ℹ️ Havola o'chirildi. Tugma havolasiz ko'rsatilmaydi.")
                .await?;
        }
        ShareUrlEdit::Set(url) => {
            app.db.set_setting(SHARE_BUTTON_URL, &url).await?;
            app.db.add_log(admin, "share_button_url_update").await?;
            dialogue.exit().await?;
            bot.send_message(chat, "✅ Havola muvaffaqiyatli yangilandi.")
                .await?;
        }
    }
    send_share_overview(&bot, chat, &app).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_prompt_escapes_current_text() {
        let prompt = text_prompt(START.title, "<b>Salom</b>");
        assert!(prompt.starts_with("📝 <b>Start xabarini tahrirlash</b>"));
        assert!(prompt.contains("<pre>&lt;b&gt;Salom&lt;"));
    }

    #[test]
    fn test_parse_share_text() {
        assert_eq!(parse_share_text(" Bekor "), ShareTextEdit::Cancel);
        assert_eq!(
            parse_share_text("DEFAULT"),
            ShareTextEdit::Set(default_setting(SHARE_BUTTON_TEXT).unwrap().to_owned())
        );
        assert_eq!(parse_share_text("   "), ShareTextEdit::Empty);
        assert_eq!(parse_share_text(&"ж".repeat(65)), ShareTextEdit::TooLong);
        assert_eq!(
            parse_share_text(&"ж".repeat(64)),
            ShareTextEdit::Set("ж".repeat(64))
        );
    }

    #[test]
    fn test_parse_share_url() {
        assert_eq!(parse_share_url("cancel"), ShareUrlEdit::Cancel);
        assert_eq!(parse_share_url("O'chirish"), ShareUrlEdit::Clear);
        assert_eq!(parse_share_url("0"), ShareUrlEdit::Clear);
        assert_eq!(
            parse_share_url("t.me/saver_bot"),
            ShareUrlEdit::Set("https://t.me/saver_bot".to_owned())
        );
        assert_eq!(parse_share_url("example.com"), ShareUrlEdit::Invalid);
    }

    #[test]
    fn test_share_settings_render() {
        let settings = ShareSettings {
            enabled: false,
            text: String::new(),
            url: String::new(),
        };
        let text = settings.render();
        assert!(text.contains("Holati: ❌ O'chirilgan"));
        assert!(text.contains("<i>Matn kiritilmagan</i>"));
        assert!(text.contains("<i>Havola kiritilmagan</i>"));

        let settings = ShareSettings {
            enabled: true,
            text: "Ulash & yubor".into(),
            url: "https://t.me/share".into(),
        };
        let text = settings.render();
        assert!(text.contains("Holati: ✅ Yoqilgan"));
        assert!(text.contains("Matn: Ulash &amp; yubor"));
        assert!(text.contains("<a href=\""));
    }

    #[tokio::test]
    async fn test_share_settings_load_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("bot.db")).await.unwrap();
        let settings = ShareSettings::load(&db).await.unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.text, default_setting(SHARE_BUTTON_TEXT).unwrap());
    }
}
