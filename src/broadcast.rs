//! Mass mailing to every known user.
//!
//! The admin sends any message, optionally attaches URL buttons, previews
//! the result and confirms. Delivery copies the source message to each user
//! one by one, paced by [`RateLimiter`].

use std::future::Future;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::storage::{Database, StorageError};
use crate::telegram::{Bot, RateLimiter, TelegramError, private_chat};

/// Progress is reported after this many recipients.
pub const PROGRESS_EVERY: usize = 10;

/// Answers meaning "no buttons".
const SKIP_WORDS: &[&str] = &["yo'q", "yoq", "no"];

/// Sent to the admin when the buttons step starts.
pub const BUTTONS_INSTRUCTIONS: &str = "Agar tugma qo'shmoqchi bo'lsangiz, har qatorni 'Sarlavha - https://link' shaklida yuboring.\n\
Bir qatorga bir nechta tugma qo'shish uchun ularni '|' bilan ajrating.\n\
Masalan: \n\
Aksiya - https://example.com\n\
Qo'llab-quvvatlash - https://t.me/support | Kanal - https://t.me/example\n\n\
Tugma kerak bo'lmasa, 'Yo'q' deb yozing.";

/// A URL button attached to the broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkButton {
    pub text: String,
    pub url: Url,
}

/// Why a buttons message was rejected. Messages are shown to the admin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ButtonParseError {
    #[error("Tugmalar ro'yxati bo'sh.")]
    Empty,

    #[error("Har satr 'Sarlavha - havola' formatida bo'lishi kerak.")]
    MissingSeparator,

    #[error("Tugma sarlavhasi bo'sh bo'lishi mumkin emas.")]
    EmptyTitle,

    #[error("Havola 'http://' yoki 'https://' bilan boshlanishi kerak.")]
    InvalidUrl,

    #[error("Yaroqli tugmalar topilmadi.")]
    NoValidRows,
}

/// Returns whether the admin declined to add buttons.
#[must_use]
pub fn is_skip_word(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    SKIP_WORDS.contains(&lowered.as_str())
}

/// Parses `Title - https://url` segments, `|`-separated within a row.
pub fn parse_buttons(text: &str) -> Result<Vec<Vec<LinkButton>>, ButtonParseError> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(ButtonParseError::Empty);
    }

    let mut rows = Vec::new();
    for line in lines {
        let row = line
            .split('|')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(parse_segment)
            .collect::<Result<Vec<_>, _>>()?;
        if !row.is_empty() {
            rows.push(row);
        }
    }

    if rows.is_empty() {
        return Err(ButtonParseError::NoValidRows);
    }
    Ok(rows)
}

fn parse_segment(segment: &str) -> Result<LinkButton, ButtonParseError> {
    let (title, url) = segment
        .split_once('-')
        .ok_or(ButtonParseError::MissingSeparator)?;
    let (title, url) = (title.trim(), url.trim());
    if title.is_empty() {
        return Err(ButtonParseError::EmptyTitle);
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ButtonParseError::InvalidUrl);
    }
    let url = Url::parse(url).map_err(|_| ButtonParseError::InvalidUrl)?;
    Ok(LinkButton {
        text: title.to_owned(),
        url,
    })
}

/// Inline keyboard for the parsed rows, `None` without buttons.
#[must_use]
pub fn buttons_markup(rows: &[Vec<LinkButton>]) -> Option<InlineKeyboardMarkup> {
    if rows.is_empty() {
        return None;
    }
    Some(InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::url(b.text.clone(), b.url.clone()))
            .collect::<Vec<_>>()
    })))
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

impl BroadcastReport {
    #[must_use]
    pub fn progress_text(&self) -> String {
        format!(
            "📨 Jarayon: {}/{} | Xatoliklar: {}",
            self.success, self.total, self.failed
        )
    }

    #[must_use]
    pub fn final_text(&self) -> String {
        format!(
            "✅ Yuborish yakunlandi. Muvaffaqiyatli: {}/{}, xatoliklar: {}",
            self.success, self.total, self.failed
        )
    }

    /// Value stored in the action log.
    #[must_use]
    pub fn log_action(&self) -> String {
        format!("broadcast_sent:{}:{}", self.success, self.failed)
    }
}

/// Where a broadcast goes.
pub trait BroadcastSink {
    /// Delivers the prepared message to one user.
    fn deliver(&self, user_id: i64) -> impl Future<Output = Result<(), TelegramError>> + Send;

    /// Shows `text` to the admin. Failures are not reported.
    fn progress(&self, text: String) -> impl Future<Output = ()> + Send;
}

/// Sends to every user in order and reports progress every
/// [`PROGRESS_EVERY`] recipients and after the last one.
///
/// A flood wait is slept through and the same user is tried once more.
pub async fn execute_broadcast<S: BroadcastSink>(
    sink: &S,
    user_ids: &[i64],
    limiter: &RateLimiter,
) -> BroadcastReport {
    let mut report = BroadcastReport {
        total: user_ids.len(),
        ..BroadcastReport::default()
    };

    for (index, &user_id) in user_ids.iter().enumerate() {
        limiter.wait_and_acquire().await;

        let mut outcome = sink.deliver(user_id).await;
        if let Err(TelegramError::FloodWait(wait)) = outcome {
            limiter.handle_flood_wait(wait).await;
            outcome = sink.deliver(user_id).await;
        }

        match outcome {
            Ok(()) => report.success += 1,
            Err(TelegramError::Forbidden(_) | TelegramError::BadRequest(_)) => {
                debug!("Broadcast skipped user {}", user_id);
                report.failed += 1;
            }
            Err(e) => {
                error!("Broadcast to {} failed: {}", user_id, e);
                report.failed += 1;
            }
        }

        let sent = index + 1;
        if sent % PROGRESS_EVERY == 0 || sent == report.total {
            sink.progress(report.progress_text()).await;
        }
    }

    report
}

/// Copies one stored message to users and edits a progress message.
#[derive(Debug, Clone)]
pub struct BotBroadcast {
    bot: Bot,
    source_chat: ChatId,
    source_message: MessageId,
    markup: Option<InlineKeyboardMarkup>,
    progress_chat: ChatId,
    progress_message: MessageId,
}

impl BroadcastSink for BotBroadcast {
    async fn deliver(&self, user_id: i64) -> Result<(), TelegramError> {
        let mut request =
            self.bot
                .copy_message(private_chat(user_id), self.source_chat, self.source_message);
        if let Some(markup) = &self.markup {
            request = request.reply_markup(markup.clone());
        }
        request.await?;
        Ok(())
    }

    async fn progress(&self, text: String) {
        if let Err(e) = self
            .bot
            .edit_message_text(self.progress_chat, self.progress_message, text)
            .await
        {
            debug!("Progress message not updated: {}", e);
        }
    }
}

/// What the admin confirmed.
#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub admin_chat: ChatId,
    pub source_chat: ChatId,
    pub source_message: MessageId,
    pub markup: Option<InlineKeyboardMarkup>,
    pub initiator: Option<i64>,
}

/// Runs a confirmed broadcast end to end and logs the outcome.
pub async fn run_broadcast(
    bot: Bot,
    db: Database,
    request: BroadcastRequest,
) -> Result<BroadcastReport, BroadcastRunError> {
    let user_ids = db.user_ids().await?;
    if user_ids.is_empty() {
        bot.send_message(request.admin_chat, "Foydalanuvchilar ro'yxati bo'sh.")
            .await?;
        return Ok(BroadcastReport::default());
    }

    let progress = bot
        .send_message(
            request.admin_chat,
            format!("📨 Jo'natish boshlandi: 0/{}", user_ids.len()),
        )
        .await?;

    info!("Broadcast started for {} users", user_ids.len());
    let sink = BotBroadcast {
        bot,
        source_chat: request.source_chat,
        source_message: request.source_message,
        markup: request.markup,
        progress_chat: progress.chat.id,
        progress_message: progress.id,
    };
    let report = execute_broadcast(&sink, &user_ids, &RateLimiter::for_broadcast()).await;

    sink.progress(report.final_text()).await;
    if let Err(e) = db.add_log(request.initiator, &report.log_action()).await {
        warn!("Broadcast result not logged: {}", e);
    }
    info!(
        "Broadcast finished: {} sent, {} failed",
        report.success, report.failed
    );
    Ok(report)
}

/// Failures that stop a broadcast before it starts.
#[derive(Debug, Error)]
pub enum BroadcastRunError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Telegram(#[from] TelegramError),
}

impl From<teloxide::RequestError> for BroadcastRunError {
    fn from(err: teloxide::RequestError) -> Self {
        Self::Telegram(err.into())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_parse_buttons_rows_and_columns() {
        let rows = parse_buttons(
            "Aksiya - https://example.com\n\n\
             Yordam - https://t.me/support | Kanal - https://t.me/example",
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].text, "Aksiya");
        assert_eq!(rows[1].len(), 2);
        assert_eq!(rows[1][1].url.as_str(), "https://t.me/example");
    }

    #[test]
    fn test_parse_buttons_keeps_dashes_in_url() {
        let rows = parse_buttons("Sayt - https://my-site.example/a-b").unwrap();
        assert_eq!(rows[0][0].url.as_str(), "https://my-site.example/a-b");
    }

    #[test]
    fn test_parse_buttons_errors() {
        assert_eq!(parse_buttons("  \n "), Err(ButtonParseError::Empty));
        assert_eq!(
            parse_buttons("Sarlavha https://x.uz"),
            Err(ButtonParseError::MissingSeparator)
        );
        assert_eq!(
            parse_buttons(" - https://x.uz"),
            Err(ButtonParseError::EmptyTitle)
        );
        assert_eq!(
            parse_buttons("Kanal - t.me/kanal"),
            Err(ButtonParseError::InvalidUrl)
        );
        assert_eq!(parse_buttons("| |"), Err(ButtonParseError::NoValidRows));
    }

    #[test]
    fn test_skip_words() {
        assert!(is_skip_word("Yo'q"));
        assert!(is_skip_word(" yoq "));
        assert!(is_skip_word("NO"));
        assert!(!is_skip_word("ha"));
    }

    #[test]
    fn test_buttons_markup() {
        assert!(buttons_markup(&[]).is_none());
        let rows = parse_buttons("A - https://a.uz | B - https://b.uz").unwrap();
        let markup = buttons_markup(&rows).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
    }

    #[test]
    fn test_report_texts() {
        let report = BroadcastReport {
            total: 12,
            success: 10,
            failed: 2,
        };
        assert_eq!(report.progress_text(), "📨 Jarayon: 10/12 | Xatoliklar: 2");
        assert_eq!(report.log_action(), "broadcast_sent:10:2");
        assert!(report.final_text().contains("Muvaffaqiyatli: 10/12"));
    }

    /// Scripted delivery results; unknown users succeed.
    #[derive(Default)]
    struct FakeSink {
        script: Mutex<HashMap<i64, Vec<TelegramError>>>,
        delivered: Mutex<Vec<i64>>,
        progress: Mutex<Vec<String>>,
    }

    impl BroadcastSink for FakeSink {
        async fn deliver(&self, user_id: i64) -> Result<(), TelegramError> {
            let scripted = self
                .script
                .lock()
                .unwrap()
                .get_mut(&user_id)
                .and_then(Vec::pop);
            match scripted {
                Some(err) => Err(err),
                None => {
                    self.delivered.lock().unwrap().push(user_id);
                    Ok(())
                }
            }
        }

        async fn progress(&self, text: String) {
            self.progress.lock().unwrap().push(text);
        }
    }

    #[tokio::test]
    async fn test_execute_broadcast_counts_and_reports() {
        let sink = FakeSink::default();
        sink.script.lock().unwrap().extend([
            (3, vec![TelegramError::Forbidden("blocked".into())]),
            (7, vec![TelegramError::BadRequest("chat not found".into())]),
        ]);
        let users: Vec<i64> = (1..=12).collect();
        let limiter = RateLimiter::new(Duration::ZERO);

        let report = execute_broadcast(&sink, &users, &limiter).await;

        assert_eq!(
            report,
            BroadcastReport {
                total: 12,
                success: 10,
                failed: 2,
            }
        );
        let progress = sink.progress.lock().unwrap().clone();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0], "📨 Jarayon: 8/12 | Xatoliklar: 2");
        assert_eq!(progress[1], "📨 Jarayon: 10/12 | Xatoliklar: 2");
    }

    #[tokio::test]
    async fn test_execute_broadcast_retries_after_flood_wait() {
        let sink = FakeSink::default();
        sink.script
            .lock()
            .unwrap()
            .insert(2, vec![TelegramError::FloodWait(Duration::from_millis(5))]);
        let limiter = RateLimiter::new(Duration::ZERO);

        let report = execute_broadcast(&sink, &[1, 2], &limiter).await;

        assert_eq!(report.success, 2);
        assert_eq!(*sink.delivered.lock().unwrap(), vec![1, 2]);
    }
}
