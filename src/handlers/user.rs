//! What regular users see: the welcome screen, the subscription gate and
//! media downloads.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, InputFile, Me, User};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use v_htmlescape::escape;

use super::{
    AppState, HandlerResult, MediaLink, MessageRef, answer, callback_target, callback_user,
    delete_quietly, edit_or_send,
};
use crate::config::defaults::{
    SHARE_BUTTON_ENABLED, SHARE_BUTTON_TEXT, SHARE_BUTTON_URL, START_TEXT, SUBSCRIBE_TEXT,
};
use crate::config::{MAX_UPLOAD_BYTES, default_setting, is_truthy};
use crate::download::{DownloadError, DownloadResult, MediaKind, cleanup_file};
use crate::storage::{Database, StorageError};
use crate::subscription::{SubscriptionStatus, ensure_user_subscription};
use crate::telegram::keyboards::{share_button, subscription_keyboard};
use crate::telegram::{Bot, TelegramError, user_key};

/// Titles longer than this are cut so the caption stays within Telegram's
/// 1024 character limit.
const MAX_TITLE_CHARS: usize = 700;

const USAGE_HINT: &str = "Instagram, TikTok, Snapchat, Likee yoki YouTube havolasini yuboring, \
men esa siz uchun videoni yuklab beraman.";

pub(super) async fn start(bot: Bot, msg: Message, app: Arc<AppState>) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = remember_user(&app.db, user).await?;

    let status = ensure_user_subscription(&bot, &app.db, user_id).await?;
    if !status.allowed {
        send_subscription_prompt(&bot, msg.chat.id, &app.db, status).await?;
        app.db.add_log(Some(user_id), "subscription_prompt").await?;
        return Ok(());
    }

    let welcome = app.db.setting_or_default(START_TEXT).await?;
    bot.send_message(msg.chat.id, welcome).await?;
    app.db.add_log(Some(user_id), "start_command").await?;
    Ok(())
}

pub(super) async fn check_subscription(
    bot: Bot,
    q: CallbackQuery,
    app: Arc<AppState>,
) -> HandlerResult {
    let user_id = callback_user(&q);
    let status = ensure_user_subscription(&bot, &app.db, user_id).await?;

    if status.allowed {
        let welcome = app.db.setting_or_default(START_TEXT).await?;
        if let Some(target) = callback_target(&q) {
            edit_or_send(&bot, target, &welcome, None).await?;
        }
        answer(&bot, &q, "Rahmat! Obuna tasdiqlandi.", false).await?;
        app.db.add_log(Some(user_id), "subscription_confirmed").await?;
    } else {
        answer(&bot, &q, "⚠️ Kanalga a'zo bo'lmagansiz.", true).await?;
        app.db.add_log(Some(user_id), "subscription_pending").await?;
    }
    Ok(())
}

pub(super) async fn download(
    bot: Bot,
    msg: Message,
    me: Me,
    link: MediaLink,
    app: Arc<AppState>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = remember_user(&app.db, user).await?;

    let subscription = ensure_user_subscription(&bot, &app.db, user_id).await?;
    if !subscription.allowed {
        send_subscription_prompt(&bot, msg.chat.id, &app.db, subscription).await?;
        return Ok(());
    }

    let MediaLink(url) = link;
    info!("Download requested by {}: {}", user_id, url);
    let status = bot
        .send_message(msg.chat.id, "⏳ Yuklab olinmoqda, biroz kuting...")
        .await?;
    let status = MessageRef::from(&status);

    let outcome = match app.downloader.download(&url).await {
        Ok(result) => {
            let uploader = format_uploader(user);
            let outcome = deliver(&bot, msg.chat.id, &me, &app.db, &result, &uploader).await;
            cleanup_file(&result.file_path).await;
            outcome
        }
        Err(e) => Err(DeliveryError::Download(e)),
    };

    match outcome {
        Ok(()) => {
            app.db.increment_downloads(user_id, 1).await?;
            app.db.update_last_active(user_id).await?;
            app.db.add_log(Some(user_id), &format!("download:{url}")).await?;
            delete_quietly(&bot, status).await;
        }
        Err(failure) => {
            match &failure {
                DeliveryError::TooLarge { .. } => {
                    app.db
                        .add_log(Some(user_id), &format!("file_too_large:{url}"))
                        .await?;
                }
                DeliveryError::Download(e) => debug!("Download of {} failed: {:?}", url, e),
                other => error!("Delivering {} failed: {}", url, other),
            }
            if let Err(e) = bot
                .edit_message_text(status.chat, status.id, failure.user_text())
                .await
            {
                warn!("Status message not updated: {}", e);
            }
        }
    }
    Ok(())
}

pub(super) async fn fallback(bot: Bot, msg: Message) -> HandlerResult {
    if msg.from.as_ref().is_none_or(|u| u.is_bot) {
        return Ok(());
    }
    bot.send_message(msg.chat.id, USAGE_HINT).await?;
    Ok(())
}

/// Upserts the sender and returns their database key.
async fn remember_user(db: &Database, user: &User) -> Result<i64, StorageError> {
    let user_id = user_key(user.id);
    db.add_or_update_user(user_id, user.username.as_deref(), Some(&user.first_name))
        .await?;
    Ok(user_id)
}

async fn send_subscription_prompt(
    bot: &Bot,
    chat: ChatId,
    db: &Database,
    status: SubscriptionStatus,
) -> HandlerResult {
    let prompt = db.setting_or_default(SUBSCRIBE_TEXT).await?;
    let channels = if status.missing.is_empty() {
        db.channels().await?
    } else {
        status.missing
    };
    bot.send_message(chat, prompt)
        .reply_markup(subscription_keyboard(&channels))
        .await?;
    Ok(())
}

/// Ways a download can end without media reaching the user.
#[derive(Debug, Error)]
enum DeliveryError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("file of {bytes} bytes is over the upload limit")]
    TooLarge { bytes: u64, rejected_by_telegram: bool },

    #[error(transparent)]
    Telegram(#[from] TelegramError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeliveryError {
    fn user_text(&self) -> String {
        match self {
            Self::Download(e) => e.to_string(),
            Self::TooLarge {
                bytes,
                rejected_by_telegram,
            } => too_large_text(*bytes, *rejected_by_telegram),
            Self::Telegram(TelegramError::BadRequest(_)) => {
                "Media yuborishda xatolik yuz berdi. Keyinroq urinib ko'ring.".to_owned()
            }
            Self::Telegram(_) | Self::Storage(_) | Self::Io(_) => {
                DownloadError::Unexpected.to_string()
            }
        }
    }
}

fn too_large_text(bytes: u64, rejected_by_telegram: bool) -> String {
    #[allow(clippy::cast_precision_loss)]
    let size_mb = bytes as f64 / (1024.0 * 1024.0);
    let verb = if rejected_by_telegram { " ekan" } else { "" };
    format!(
        "Video hajmi {size_mb:.1} MB{verb}. Telegram botlarida 50 MB dan katta fayllarni yuborib bo'lmaydi."
    )
}

/// Sends the downloaded file with its caption and the share button.
async fn deliver(
    bot: &Bot,
    chat: ChatId,
    me: &Me,
    db: &Database,
    result: &DownloadResult,
    uploader: &str,
) -> Result<(), DeliveryError> {
    let bytes = tokio::fs::metadata(&result.file_path).await?.len();
    if bytes > MAX_UPLOAD_BYTES {
        return Err(DeliveryError::TooLarge {
            bytes,
            rejected_by_telegram: false,
        });
    }

    let caption = build_caption(
        &result.title,
        result.duration,
        uploader,
        me.user.username.as_deref(),
    );
    let markup = share_markup(db).await?;

    match send_media(bot, chat, result, caption, markup).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_too_large() => Err(DeliveryError::TooLarge {
            bytes,
            rejected_by_telegram: true,
        }),
        Err(e) => Err(e.into()),
    }
}

async fn send_media(
    bot: &Bot,
    chat: ChatId,
    result: &DownloadResult,
    caption: String,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<(), TelegramError> {
    let file = InputFile::file(result.file_path.clone());
    match result.kind {
        MediaKind::Photo => {
            let mut request = bot.send_photo(chat, file).caption(caption);
            if let Some(markup) = markup {
                request = request.reply_markup(markup);
            }
            request.await?;
        }
        MediaKind::Video if result.ext == "mp4" => {
            let mut request = bot
                .send_video(chat, file)
                .caption(caption)
                .supports_streaming(true);
            if let Some(markup) = markup {
                request = request.reply_markup(markup);
            }
            request.await?;
        }
        MediaKind::Video => {
            let mut request = bot.send_document(chat, file).caption(caption);
            if let Some(markup) = markup {
                request = request.reply_markup(markup);
            }
            request.await?;
        }
    }
    Ok(())
}

/// The share button, when it is enabled and has a target.
async fn share_markup(db: &Database) -> Result<Option<InlineKeyboardMarkup>, StorageError> {
    if !is_truthy(&db.setting_or_default(SHARE_BUTTON_ENABLED).await?) {
        return Ok(None);
    }
    let url = db.setting_or_default(SHARE_BUTTON_URL).await?;
    if url.trim().is_empty() {
        return Ok(None);
    }
    let text = db.setting_or_default(SHARE_BUTTON_TEXT).await?;
    let text = match text.trim() {
        "" => default_setting(SHARE_BUTTON_TEXT).unwrap_or_default().to_owned(),
        trimmed => trimmed.to_owned(),
    };
    Ok(share_button(&text, &url))
}

/// `@username`, else the full name, else the numeric id. HTML-escaped.
fn format_uploader(user: &User) -> String {
    uploader_label(
        user.username.as_deref(),
        &user.full_name(),
        user_key(user.id),
    )
}

fn uploader_label(username: Option<&str>, full_name: &str, user_id: i64) -> String {
    if let Some(username) = username.filter(|u| !u.is_empty()) {
        return format!("@{}", escape(username));
    }
    let full_name = full_name.trim();
    if full_name.is_empty() {
        user_id.to_string()
    } else {
        escape(full_name).to_string()
    }
}

/// `M:SS`, or `H:MM:SS` from one hour up.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (hours, minutes, secs) = (total / 3600, total % 3600 / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// HTML caption for delivered media. `uploader` must already be escaped.
pub fn build_caption(
    title: &str,
    duration: Option<f64>,
    uploader: &str,
    bot_username: Option<&str>,
) -> String {
    let title = if title.chars().count() > MAX_TITLE_CHARS {
        let cut: String = title.chars().take(MAX_TITLE_CHARS).collect();
        format!("{cut}...")
    } else {
        title.to_owned()
    };

    let mut lines = vec![format!("🎬 <b>{}</b>", escape(&title))];
    if let Some(duration) = duration.filter(|d| *d > 0.0) {
        lines.push(format!("⏱ Davomiyligi: {}", format_duration(duration)));
    }
    lines.push("🤖 <b>Video yuklash tugallandi!</b>".to_owned());
    lines.push(format!("👤 Yuklovchi: {uploader}"));
    if let Some(name) = bot_username.filter(|n| !n.is_empty()) {
        let name = name.trim_start_matches('@');
        lines.push(format!("🔗 @{} orqali yuklandi.", escape(name)));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(59.9), "0:59");
        assert_eq!(format_duration(75.0), "1:15");
        assert_eq!(format_duration(3_725.0), "1:02:05");
    }

    #[test]
    fn test_build_caption_full() {
        let caption = build_caption("Cats & dogs", Some(75.0), "@ali", Some("saver_bot"));
        assert_eq!(
            caption,
            "🎬 <b>Cats &amp; dogs</b>\n\
             ⏱ Davomiyligi: 1:15\n\
             🤖 <b>Video yuklash tugallandi!</b>\n\
             👤 Yuklovchi: @ali\n\
             🔗 @saver_bot orqali yuklandi."
        );
    }

    #[test]
    fn test_build_caption_skips_missing_parts() {
        let caption = build_caption("Clip", Some(0.0), "42", None);
        assert!(!caption.contains("Davomiyligi"));
        assert!(!caption.contains("orqali yuklandi"));
        assert!(caption.ends_with("👤 Yuklovchi: 42"));
    }

    #[test]
    fn test_build_caption_truncates_long_titles() {
        let title = "a".repeat(2_000);
        let caption = build_caption(&title, Some(3_600.0), "@ali", Some("@saver_bot"));
        assert!(caption.chars().count() < 1024);
        assert!(caption.contains("🔗 @saver_bot orqali"));
    }

    #[test]
    fn test_uploader_label() {
        assert_eq!(uploader_label(Some("ali"), "Ali Valiyev", 1), "@ali");
        assert_eq!(uploader_label(None, "Ali <Valiyev>", 1), "Ali &lt;Valiyev&gt;");
        assert_eq!(uploader_label(Some(""), "  ", 7), "7");
    }

    #[test]
    fn test_too_large_text() {
        assert_eq!(
            too_large_text(60 * 1024 * 1024, false),
            "Video hajmi 60.0 MB. Telegram botlarida 50 MB dan katta fayllarni yuborib bo'lmaydi."
        );
        assert!(too_large_text(52 * 1024 * 1024, true).starts_with("Video hajmi 52.0 MB ekan."));
    }

    #[test]
    fn test_delivery_error_texts() {
        let bad = DeliveryError::Telegram(TelegramError::BadRequest("x".into()));
        assert_eq!(
            bad.user_text(),
            "Media yuborishda xatolik yuz berdi. Keyinroq urinib ko'ring."
        );
        let download = DeliveryError::Download(DownloadError::ExtractorFailed);
        assert_eq!(download.user_text(), DownloadError::ExtractorFailed.to_string());
    }

    #[tokio::test]
    async fn test_share_markup_follows_settings() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("bot.db")).await.unwrap();

        db.set_setting(SHARE_BUTTON_ENABLED, "1").await.unwrap();
        db.set_setting(SHARE_BUTTON_URL, "").await.unwrap();
        assert!(share_markup(&db).await.unwrap().is_none());

        db.set_setting(SHARE_BUTTON_URL, "https://t.me/share/url?url=x").await.unwrap();
        db.set_setting(SHARE_BUTTON_TEXT, "  ").await.unwrap();
        let markup = share_markup(&db).await.unwrap().unwrap();
        assert_eq!(
            markup.inline_keyboard[0][0].text,
            default_setting(SHARE_BUTTON_TEXT).unwrap()
        );

        db.set_setting(SHARE_BUTTON_ENABLED, "0").await.unwrap();
        assert!(share_markup(&db).await.unwrap().is_none());
    }
}
