//! Mandatory subscription channels.

use std::fmt::Write as _;
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{Chat, InlineKeyboardMarkup};
use tracing::{debug, info};
use v_htmlescape::escape;

use super::{
    AppState, BotDialogue, HandlerResult, State, answer, callback_target, callback_user,
    edit_or_send, send_with_markup,
};
use crate::commands::{is_cancel_word, normalize_channel_lookup};
use crate::config::defaults::SUBSCRIPTION_ENABLED;
use crate::config::is_truthy;
use crate::storage::{Channel, Database, StorageError};
use crate::subscription::channel_recipient;
use crate::telegram::keyboards::{
    channels_back_keyboard, channels_list_keyboard, channels_management_keyboard,
};
use crate::telegram::{Bot, user_key};

const UNKNOWN_TITLE: &str = "Noma'lum";

async fn subscription_enabled(db: &Database) -> Result<bool, StorageError> {
    Ok(is_truthy(&db.setting_or_default(SUBSCRIPTION_ENABLED).await?))
}

fn channel_title(channel: &Channel) -> String {
    channel
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .map_or_else(|| UNKNOWN_TITLE.to_owned(), |t| escape(t).to_string())
}

fn render_management(channels: &[Channel], enabled: bool) -> String {
    let mut text = String::from("📺 <b>Kanal boshqaruvi</b>\n\n");
    text.push_str(if enabled {
        "🔒 Majburiy obuna: Yoqilgan ✅\n\n"
    } else {
        "🔒 Majburiy obuna: O'chirilgan ❌\n\n"
    });
    if channels.is_empty() {
        text.push_str("Hech qanday majburiy obuna kanali yo'q.");
    } else {
        text.push_str("Majburiy obuna kanallari:\n");
        for (i, channel) in channels.iter().enumerate() {
            let _ = writeln!(text, "{}. {}", i + 1, channel_title(channel));
        }
    }
    text.push_str("\n\nAmalni tanlang:");
    text
}

async fn management_view(db: &Database) -> Result<(String, InlineKeyboardMarkup), StorageError> {
    let channels = db.channels().await?;
    let enabled = subscription_enabled(db).await?;
    Ok((
        render_management(&channels, enabled),
        channels_management_keyboard(enabled),
    ))
}

/// Sends the channel management view as a new message.
pub(super) async fn send_management(bot: &Bot, chat: ChatId, app: &AppState) -> HandlerResult {
    let (text, keyboard) = management_view(&app.db).await?;
    send_with_markup(bot, chat, &text, Some(keyboard)).await
}

async fn redraw_management(bot: &Bot, q: &CallbackQuery, db: &Database) -> HandlerResult {
    if let Some(target) = callback_target(q) {
        let (text, keyboard) = management_view(db).await?;
        edit_or_send(bot, target, &text, Some(keyboard)).await?;
    }
    Ok(())
}

pub(super) async fn show_management(
    bot: Bot,
    q: CallbackQuery,
    app: Arc<AppState>,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    redraw_management(&bot, &q, &app.db).await
}

pub(super) async fn toggle_subscription(
    bot: Bot,
    q: CallbackQuery,
    app: Arc<AppState>,
) -> HandlerResult {
    let enabled = !subscription_enabled(&app.db).await?;
    app.db
        .set_setting(SUBSCRIPTION_ENABLED, if enabled { "1" } else { "0" })
        .await?;
    info!("Mandatory subscription enabled: {}", enabled);

    redraw_management(&bot, &q, &app.db).await?;
    let status = if enabled { "yoqildi ✅" } else { "o'chirildi ❌" };
    answer(&bot, &q, &format!("🔒 Majburiy obuna {status}"), true).await
}

fn render_channel_list(channels: &[Channel]) -> String {
    let mut text = String::from("📋 <b>Kanallar ro'yxati</b>\n\n");
    if channels.is_empty() {
        text.push_str("Hech qanday kanal qo'shilmagan.");
        return text;
    }
    for (i, channel) in channels.iter().enumerate() {
        let link = escape(&channel.link);
        let _ = write!(
            text,
            "{}. <b>{}</b>\n\
             \u{2002}🆔 ID: <code>{}</code>\n\
             \u{2002}🔗 Havola: <a href=\"{link}\">{link}</a>\n\n",
            i + 1,
            channel_title(channel),
            escape(&channel.channel_id),
        );
    }
    text
}

pub(super) async fn show_list(bot: Bot, q: CallbackQuery, app: Arc<AppState>) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let channels = app.db.channels().await?;
    if let Some(target) = callback_target(&q) {
        edit_or_send(
            &bot,
            target,
            &render_channel_list(&channels),
            Some(channels_list_keyboard(&channels)),
        )
        .await?;
    }
    Ok(())
}

pub(super) async fn show_delete(bot: Bot, q: CallbackQuery, app: Arc<AppState>) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let channels = app.db.channels().await?;
    let (text, keyboard) = if channels.is_empty() {
        (
            "🗑 <b>Kanal o'chirish</b>\n\nO'chirish uchun kanallar yo'q.",
            channels_back_keyboard(),
        )
    } else {
        (
            "🗑 <b>Kanal o'chirish</b>\n\nO'chirish uchun kanalni tanlang:",
            channels_list_keyboard(&channels),
        )
    };
    if let Some(target) = callback_target(&q) {
        edit_or_send(&bot, target, text, Some(keyboard)).await?;
    }
    Ok(())
}

pub(super) async fn remove(
    bot: Bot,
    q: CallbackQuery,
    app: Arc<AppState>,
    channel_id: String,
) -> HandlerResult {
    let channels = app.db.channels().await?;
    let Some(channel) = channels.iter().find(|c| c.channel_id == channel_id) else {
        answer(&bot, &q, "❌ Kanal topilmadi", true).await?;
        return redraw_management(&bot, &q, &app.db).await;
    };

    app.db.remove_channel(&channel_id).await?;
    app.db
        .add_log(Some(callback_user(&q)), &format!("channel_remove:{channel_id}"))
        .await?;
    info!("Channel {} removed", channel_id);

    let title = channel
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or("Noma'lum kanal");
    answer(&bot, &q, &format!("✅ {title} kanali o'chirildi"), true).await?;
    redraw_management(&bot, &q, &app.db).await
}

pub(super) async fn start_add(bot: Bot, q: CallbackQuery, dialogue: BotDialogue) -> HandlerResult {
    dialogue.update(State::ChannelLink).await?;
    bot.answer_callback_query(q.id.clone()).await?;
    if let Some((chat, _)) = callback_target(&q) {
        bot.send_message(
            chat,
            "📡 Yangi kanal qo'shish uchun kanal havolasini yuboring yoki kanal postini forward qiling.",
        )
        .await?;
    }
    Ok(())
}

/// Public link of a channel, else the link the admin typed, else an invite
/// link the bot can export.
async fn channel_link(bot: &Bot, chat: &Chat, typed: Option<String>) -> Option<String> {
    if let Some(username) = chat.username() {
        return Some(format!("https://t.me/{username}"));
    }
    if typed.is_some() {
        return typed;
    }
    match bot.export_chat_invite_link(chat.id).await {
        Ok(link) => Some(link),
        Err(e) => {
            debug!("No invite link for {}: {}", chat.id, e);
            None
        }
    }
}

/// The admin sent a channel post or a link while adding a channel.
pub(super) async fn receive_channel(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    if !super::admin::ensure_admin_message(&bot, &msg, &app).await? {
        dialogue.exit().await?;
        return Ok(());
    }

    let (chat, typed_link) = match msg.forward_from_chat().filter(|c| c.is_channel()) {
        Some(chat) => (chat.clone(), None),
        None => {
            let raw = msg.text().unwrap_or_default().trim();
            if is_cancel_word(raw) {
                dialogue.exit().await?;
                bot.send_message(msg.chat.id, "O'zgarishlar bekor qilindi.").await?;
                return Ok(());
            }
            let Some(lookup) = normalize_channel_lookup(raw) else {
                bot.send_message(msg.chat.id, "Havola topilmadi, qayta yuboring.")
                    .await?;
                return Ok(());
            };
            match bot.get_chat(channel_recipient(&lookup)).await {
                Ok(chat) => {
                    let link = raw.starts_with("http").then(|| raw.to_owned());
                    (chat, link)
                }
                Err(e) => {
                    debug!("Channel lookup {} failed: {}", lookup, e);
                    bot.send_message(msg.chat.id, "Kanal topilmadi. Havolani tekshirib ko'ring.")
                        .await?;
                    return Ok(());
                }
            }
        }
    };

    let Some(link) = channel_link(&bot, &chat, typed_link).await else {
        bot.send_message(
            msg.chat.id,
            "Taklif havolasini ham yuboring. Kanal yopiq bo'lsa, botni kanalga admin qiling \
             yoki 'https://t.me/+....' ko'rinishidagi havolani kiriting.",
        )
        .await?;
        return Ok(());
    };

    let channel_id = chat.id.to_string();
    let title = chat.title().unwrap_or(link.as_str()).to_owned();
    app.db.add_channel(&channel_id, &title, &link).await?;
    app.db
        .add_log(
            msg.from.as_ref().map(|u| user_key(u.id)),
            &format!("channel_add:{channel_id}"),
        )
        .await?;
    info!("Channel {} ({}) added", channel_id, title);
    dialogue.exit().await?;

    let enabled = subscription_enabled(&app.db).await?;
    send_with_markup(
        &bot,
        msg.chat.id,
        "✅ Kanal muvaffaqiyatli qo'shildi.",
        Some(channels_management_keyboard(enabled)),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str, title: Option<&str>, link: &str) -> Channel {
        Channel {
            channel_id: id.to_owned(),
            title: title.map(str::to_owned),
            link: link.to_owned(),
        }
    }

    #[test]
    fn test_render_management() {
        let text = render_management(
            &[
                channel("-1001", Some("News & more"), "https://t.me/news"),
                channel("-1002", None, "https://t.me/x"),
            ],
            true,
        );
        assert!(text.starts_with("📺 <b>Kanal boshqaruvi</b>"));
        assert!(text.contains("Yoqilgan ✅"));
        assert!(text.contains("1. News &amp; more\n"));
        assert!(text.contains("2. Noma'lum\n"));
        assert!(text.ends_with("Amalni tanlang:"));

        let empty = render_management(&[], false);
        assert!(empty.contains("O'chirilgan ❌"));
        assert!(empty.contains("Hech qanday majburiy obuna kanali yo'q."));
    }

    #[test]
    fn test_render_channel_list() {
        let text = render_channel_list(&[channel("-1001", Some("News"), "https://t.me/news")]);
        assert!(text.contains("1. <b>News</b>"));
        assert!(text.contains("ID: <code>-1001</code>"));
        assert!(text.contains("<a href=\""));

        assert!(render_channel_list(&[]).ends_with("Hech qanday kanal qo'shilmagan."));
    }

    #[tokio::test]
    async fn test_subscription_enabled_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("bot.db")).await.unwrap();
        assert!(subscription_enabled(&db).await.unwrap());
        db.set_setting(SUBSCRIPTION_ENABLED, "0").await.unwrap();
        assert!(!subscription_enabled(&db).await.unwrap());
    }
}
