//! Admin panel: the reply-keyboard menu, statistics, maintenance tools and
//! admin management.

use std::fmt::{Display, Write as _};
use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{error, info, warn};
use v_htmlescape::escape;

use super::{
    AppState, BotDialogue, HandlerResult, MessageRef, State, answer, broadcast, callback_target,
    callback_user, channels, delete_quietly, edit_or_send, send_with_markup, settings,
};
use crate::commands::{AdminButton, is_cancel_word};
use crate::config::defaults::START_TEXT;
use crate::stats::{GROWTH_CHART_DAYS, StatsOverview, render_detailed};
use crate::storage::{
    AdminPermission, AdminRecord, Database, LogEntry, StorageError, UserRecord,
    create_database_backup,
};
use crate::system::format_uptime;
use crate::telegram::keyboards::{
    admin_main_keyboard, admin_menu_back_keyboard, admin_menu_keyboard, admin_remove_keyboard,
    permission_admins_keyboard, permission_toggle_keyboard, stats_details_keyboard,
};
use crate::telegram::{Bot, user_key};

const ADMINS_ONLY: &str = "Bu bo'lim faqat adminlar uchun.";

/// Users listed on the monthly activity screen.
const MONTHLY_USERS_LIMIT: u32 = 25;

/// Entries kept when the monthly list does not fit in one message.
const MONTHLY_USERS_TRIMMED: usize = 15;

/// Telegram rejects longer messages; stay below with some margin.
const MAX_MESSAGE_CHARS: usize = 4000;

const RECENT_LOGS_LIMIT: u32 = 20;

const ADMIN_MENU_TEXT: &str = "👑 <b>Admin boshqaruvi</b>\n\nQuyidagi amallardan birini tanlang:";

// ----------------------------------------------------------------------
// Guards
// ----------------------------------------------------------------------

/// Replies with a refusal unless the sender is an admin.
pub(super) async fn ensure_admin_message(
    bot: &Bot,
    msg: &Message,
    app: &AppState,
) -> anyhow::Result<bool> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(false);
    };
    if app.db.is_admin(user_key(user.id)).await? {
        return Ok(true);
    }
    bot.send_message(msg.chat.id, ADMINS_ONLY).await?;
    Ok(false)
}

/// Answers with an alert unless the presser is an admin.
pub(super) async fn ensure_admin_callback(
    bot: &Bot,
    q: &CallbackQuery,
    app: &AppState,
) -> anyhow::Result<bool> {
    if app.db.is_admin(callback_user(q)).await? {
        return Ok(true);
    }
    answer(bot, q, ADMINS_ONLY, true).await?;
    Ok(false)
}

/// Answers with `refusal` unless the presser is the main admin.
async fn ensure_main_admin(
    bot: &Bot,
    q: &CallbackQuery,
    app: &AppState,
    refusal: &str,
) -> anyhow::Result<bool> {
    if app.is_main_admin(callback_user(q)) {
        return Ok(true);
    }
    answer(bot, q, refusal, true).await?;
    Ok(false)
}

// ----------------------------------------------------------------------
// Entry points
// ----------------------------------------------------------------------

pub(super) async fn panel(bot: Bot, msg: Message, app: Arc<AppState>) -> HandlerResult {
    if !ensure_admin_message(&bot, &msg, &app).await? {
        return Ok(());
    }
    let name = msg
        .from
        .as_ref()
        .map_or_else(|| "Admin".to_owned(), |u| u.first_name.clone());
    bot.send_message(msg.chat.id, welcome_text(&name))
        .reply_markup(admin_main_keyboard())
        .await?;
    Ok(())
}

fn welcome_text(name: &str) -> String {
    format!(
        "👋 Assalomu alaykum, <b>{}</b>!\n\n\
         🔧 <b>Admin panelga xush kelibsiz</b>\n\
         Quyidagi bo'limlardan birini tanlang:\n\n\
         📊 <i>Statistika</i> - Bot statistikalarini ko'rish\n\
         📢 <i>Kanallar</i> - Majburiy obuna kanallarini boshqarish\n\
         👑 <i>Adminlar</i> - Admin huquqlarini boshqarish\n\
         📨 <i>Xabar yuborish</i> - Barcha foydalanuvchilarga xabar\n\
         📝 <i>Start matni</i> - Bot xush kelibsiz matnini o'zgartirish\n\
         🔗 <i>Ulashish tugmasi</i> - Yuklab olingan video tugmasini sozlash",
        escape(name)
    )
}

/// A reply-keyboard button was pressed. Any unfinished dialogue is dropped.
pub(super) async fn menu_button(
    bot: Bot,
    msg: Message,
    button: AdminButton,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    if !ensure_admin_message(&bot, &msg, &app).await? {
        return Ok(());
    }
    if let Some(state) = dialogue.get().await?
        && state != State::Idle
    {
        if let Some(preview) = state.broadcast_preview() {
            delete_quietly(&bot, preview).await;
        }
        dialogue.exit().await?;
    }

    let chat = msg.chat.id;
    match button {
        AdminButton::Stats => show_stats(&bot, chat, &app).await,
        AdminButton::Channels => channels::send_management(&bot, chat, &app).await,
        AdminButton::Admins => {
            send_with_markup(&bot, chat, ADMIN_MENU_TEXT, Some(admin_menu_keyboard())).await
        }
        AdminButton::Broadcast => broadcast::start(bot, msg, dialogue).await,
        AdminButton::EditStartText => settings::start_start_text(bot, msg, dialogue, app).await,
        AdminButton::ShareButton => settings::send_share_overview(&bot, chat, &app).await,
        AdminButton::MonthlyUsers => monthly_users(&bot, chat, &app).await,
        AdminButton::Logs => show_logs(&bot, chat, &app.db).await,
        AdminButton::Backup => send_backup(&bot, &msg, &app).await,
        AdminButton::Uptime => show_uptime(&bot, chat, &app.db).await,
        AdminButton::SelfTest => self_test(&bot, &msg, &app).await,
        AdminButton::Back => {
            bot.send_message(chat, "Bosh menyu.")
                .reply_markup(admin_main_keyboard())
                .await?;
            Ok(())
        }
    }
}

pub(super) async fn backup(bot: Bot, msg: Message, app: Arc<AppState>) -> HandlerResult {
    if !ensure_admin_message(&bot, &msg, &app).await? {
        return Ok(());
    }
    send_backup(&bot, &msg, &app).await
}

pub(super) async fn ping(bot: Bot, msg: Message, app: Arc<AppState>) -> HandlerResult {
    if !ensure_admin_message(&bot, &msg, &app).await? {
        return Ok(());
    }
    bot.send_message(msg.chat.id, format!("✅ Bot faol. Uptime: {}", format_uptime()))
        .await?;
    Ok(())
}

// ----------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------

async fn show_stats(bot: &Bot, chat: ChatId, app: &AppState) -> HandlerResult {
    match StatsOverview::load(&app.db, GROWTH_CHART_DAYS).await {
        Ok(overview) => {
            send_with_markup(
                bot,
                chat,
                &overview.render(Utc::now()),
                Some(stats_details_keyboard()),
            )
            .await
        }
        Err(e) => {
            error!("Statistics not loaded: {}", e);
            bot.send_message(chat, format!("❌ Statistika olishda xato: {}", escape(&e.to_string())))
                .await?;
            Ok(())
        }
    }
}

pub(super) async fn detailed_stats(
    bot: Bot,
    q: CallbackQuery,
    app: Arc<AppState>,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let Some(target) = callback_target(&q) else {
        return Ok(());
    };
    let text = match app.db.detailed_statistics().await {
        Ok(stats) => render_detailed(&stats),
        Err(e) => {
            error!("Detailed statistics not loaded: {}", e);
            format!("❌ Xato yuz berdi: {}", escape(&e.to_string()))
        }
    };
    edit_or_send(&bot, target, &text, None).await
}

async fn monthly_users(bot: &Bot, chat: ChatId, app: &AppState) -> HandlerResult {
    let users = match app.db.monthly_active_users(MONTHLY_USERS_LIMIT).await {
        Ok(users) => users,
        Err(e) => {
            error!("Monthly users not loaded: {}", e);
            bot.send_message(chat, format!("❌ Xato yuz berdi: {}", escape(&e.to_string())))
                .await?;
            return Ok(());
        }
    };
    if users.is_empty() {
        bot.send_message(chat, "❌ So'nggi 30 kun ichida faol foydalanuvchilar topilmadi.")
            .await?;
        return Ok(());
    }

    if let Err(e) = app.badge.refresh(bot).await {
        warn!("Profile badge not refreshed: {}", e);
    }
    send_with_markup(bot, chat, &render_monthly_users(&users), None).await
}

fn monthly_user_entry(index: usize, user: &UserRecord) -> String {
    let first_name = user
        .first_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .map_or_else(|| "❓ Noma'lum".to_owned(), |n| escape(n).to_string());
    let mut name = format!("<a href='tg://user?id={}'>{first_name}</a>", user.user_id);
    if let Some(username) = user.username.as_deref().filter(|u| !u.is_empty()) {
        let _ = write!(name, " (@{})", escape(username));
    }
    let last_active = user
        .last_active
        .map_or_else(|| "noma'lum".to_owned(), |at| at.format("%d.%m %H:%M").to_string());
    format!(
        "{index}. {name}\n   📅 <i>{last_active}</i> • 📥 <i>{} yuklab olish</i>",
        user.downloads_count
    )
}

/// The monthly users message, cut to the first entries when too long.
fn render_monthly_users(users: &[UserRecord]) -> String {
    let header = format!(
        "🗓 <b>So'nggi 30 kun ichida faol foydalanuvchilar</b>\n📊 Jami: {} ta (eng faollari)\n\n",
        users.len()
    );
    let entries: Vec<String> = users
        .iter()
        .enumerate()
        .map(|(i, user)| monthly_user_entry(i + 1, user))
        .collect();

    let text = format!("{header}{}", entries.join("\n"));
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text;
    }
    let kept = &entries[..entries.len().min(MONTHLY_USERS_TRIMMED)];
    format!("{header}{}\n\n<i>... va boshqalar</i>", kept.join("\n"))
}

async fn show_logs(bot: &Bot, chat: ChatId, db: &Database) -> HandlerResult {
    let logs = db.recent_logs(RECENT_LOGS_LIMIT).await?;
    bot.send_message(chat, render_logs(&logs)).await?;
    Ok(())
}

fn render_logs(logs: &[LogEntry]) -> String {
    if logs.is_empty() {
        return "📜 Loglar hali yo'q.".to_owned();
    }
    let mut text = String::from("📜 <b>So'nggi amallar</b>\n\n");
    for entry in logs {
        let at = entry
            .created_at
            .map_or_else(|| "--.-- --:--".to_owned(), |at| at.format("%d.%m %H:%M").to_string());
        let who = entry
            .user_id
            .map_or_else(|| "tizim".to_owned(), |id| id.to_string());
        let _ = writeln!(
            text,
            "<code>{at}</code> • {who} • {}",
            escape(&entry.action)
        );
    }
    text
}

// ----------------------------------------------------------------------
// Maintenance
// ----------------------------------------------------------------------

async fn send_backup(bot: &Bot, msg: &Message, app: &AppState) -> HandlerResult {
    let chat = msg.chat.id;
    let status = bot
        .send_message(chat, "📂 Zaxira nusxa tayyorlanmoqda...")
        .await?;

    let path = match create_database_backup(&app.db, &app.settings.backup_dir).await {
        Ok(path) => path,
        Err(e) => {
            error!("Backup failed: {}", e);
            return edit_or_send(bot, (chat, status.id), &backup_failure_text(&e), None).await;
        }
    };

    #[allow(clippy::cast_precision_loss)]
    let size_kb = tokio::fs::metadata(&path).await?.len() as f64 / 1024.0;
    let counts = app.db.user_counts().await?;
    let caption = format!(
        "📂 <b>Bot ma'lumotlari zaxirasi</b>\n\n\
         📊 <b>Statistika:</b>\n\
         • Foydalanuvchilar: {}\n\
         • Yuklab olishlar: {}\n\
         • Fayl hajmi: {size_kb:.1} KB\n\
         • Sanasi: {}\n\n\
         💾 Zaxira nusxa muvaffaqiyatli yaratildi!",
        counts.total_users,
        counts.total_downloads,
        Utc::now().format("%d.%m.%Y %H:%M"),
    );

    delete_quietly(bot, MessageRef::from(&status)).await;
    app.db
        .add_log(msg.from.as_ref().map(|u| user_key(u.id)), "backup_created")
        .await?;
    bot.send_document(chat, InputFile::file(path))
        .caption(caption)
        .await?;
    Ok(())
}

/// Replaces the "preparing" status when a backup cannot be made.
fn backup_failure_text(err: &StorageError) -> String {
    match err {
        StorageError::MissingDatabase(_) => "❌ Ma'lumotlar bazasida hali ma'lumot yo'q.".to_owned(),
        e => format!("❌ Zaxira nusxa yaratishda xato: {}", escape(&e.to_string())),
    }
}

async fn show_uptime(bot: &Bot, chat: ChatId, db: &Database) -> HandlerResult {
    let text = match db.user_counts().await {
        Ok(counts) => format!(
            "🕒 <b>Bot holati</b>\n\n\
             ⏰ <b>Ishlash vaqti:</b> {}\n\
             🔄 <b>Holati:</b> ✅ Faol\n\
             📊 <b>Tezkor ma'lumot:</b>\n\
             \u{20}  • Jami foydalanuvchilar: {}\n\
             \u{20}  • Bugun faol: {}\n\
             \u{20}  • Yuklab olishlar: {}\n\n\
             📅 <b>Tekshirilgan:</b> {}",
            format_uptime(),
            counts.total_users,
            counts.active_today,
            counts.total_downloads,
            Utc::now().format("%d.%m.%Y %H:%M"),
        ),
        Err(e) => {
            error!("Uptime view failed: {}", e);
            format!("❌ Ma'lumot olishda xato: {}", escape(&e.to_string()))
        }
    };
    bot.send_message(chat, text).await?;
    Ok(())
}

fn check_line<E: Display>(name: &str, result: Result<(), E>) -> String {
    match result {
        Ok(()) => format!("✅ {name} - <b>ISHLAYDI</b>"),
        Err(e) => format!("❌ {name} - <b>XATO:</b> {}", escape(&e.to_string())),
    }
}

/// Exercises each subsystem once and reports which of them work.
async fn self_test(bot: &Bot, msg: &Message, app: &AppState) -> HandlerResult {
    let status = bot
        .send_message(msg.chat.id, "🧪 <b>Admin panel funksiyalari tekshirilmoqda...</b>")
        .await?;

    let results = [
        check_line("Ma'lumotlar bazasi", app.db.user_counts().await.map(drop)),
        check_line(
            "Statistika tizimi",
            StatsOverview::load(&app.db, GROWTH_CHART_DAYS).await.map(drop),
        ),
        check_line(
            "Backup tizimi",
            create_database_backup(&app.db, &app.settings.backup_dir)
                .await
                .map(drop),
        ),
        check_line::<StorageError>("Uptime tizimi", {
            let _ = format_uptime();
            Ok(())
        }),
        check_line("Profil yangilash", app.badge.refresh(bot).await.map(drop)),
        check_line("Sozlamalar tizimi", app.db.setting(START_TEXT).await.map(drop)),
    ];

    let report = format!(
        "🧪 <b>Admin panel test natijalari</b>\n\n{}\n\n📅 <b>Test sanasi:</b> {}",
        results.join("\n"),
        Utc::now().format("%d.%m.%Y %H:%M")
    );
    edit_or_send(bot, (status.chat.id, status.id), &report, None).await?;
    app.db
        .add_log(msg.from.as_ref().map(|u| user_key(u.id)), "admin_test_completed")
        .await?;
    info!("Self-test completed");
    Ok(())
}

// ----------------------------------------------------------------------
// Admin management
// ----------------------------------------------------------------------

pub(super) async fn show_admin_menu(bot: Bot, q: CallbackQuery) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    if let Some(target) = callback_target(&q) {
        edit_or_send(&bot, target, ADMIN_MENU_TEXT, Some(admin_menu_keyboard())).await?;
    }
    Ok(())
}

fn render_admins(admins: &[AdminRecord]) -> String {
    if admins.is_empty() {
        return "Adminlar ro'yxati bo'sh.".to_owned();
    }
    let lines: Vec<String> = admins
        .iter()
        .enumerate()
        .map(|(i, admin)| {
            let name = admin
                .username
                .as_deref()
                .filter(|u| !u.is_empty())
                .map_or_else(|| "@nomalum".to_owned(), |u| format!("@{}", escape(u)));
            format!("{}. <b>{name}</b> - <code>{}</code>", i + 1, admin.user_id)
        })
        .collect();
    format!("👥 <b>Adminlar ro'yxati:</b>\n\n{}", lines.join("\n"))
}

pub(super) async fn show_admins(bot: Bot, q: CallbackQuery, app: Arc<AppState>) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let admins = app.db.admins().await?;
    if let Some(target) = callback_target(&q) {
        edit_or_send(
            &bot,
            target,
            &render_admins(&admins),
            Some(admin_menu_back_keyboard()),
        )
        .await?;
    }
    Ok(())
}

pub(super) async fn start_add_admin(
    bot: Bot,
    q: CallbackQuery,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    if !ensure_main_admin(&bot, &q, &app, "Faqat asosiy admin qo'sha oladi.").await? {
        return Ok(());
    }
    dialogue.update(State::AdminUser).await?;
    bot.answer_callback_query(q.id.clone()).await?;
    if let Some((chat, _)) = callback_target(&q) {
        bot.send_message(
            chat,
            "👥 Qo'shmoqchi bo'lgan foydalanuvchini ID ko'rinishida yuboring yoki uning xabarini forward qiling.",
        )
        .await?;
    }
    Ok(())
}

/// What the admin typed while adding an admin.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AdminInput {
    Id(i64),
    Username,
    Invalid,
}

fn parse_admin_input(text: &str) -> AdminInput {
    let text = text.trim();
    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse().map_or(AdminInput::Invalid, AdminInput::Id);
    }
    if text.len() > 1 && text.starts_with('@') {
        return AdminInput::Username;
    }
    AdminInput::Invalid
}

pub(super) async fn receive_admin_user(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    if !ensure_admin_message(&bot, &msg, &app).await? {
        return Ok(());
    }
    let Some(sender) = msg.from.as_ref().map(|u| user_key(u.id)) else {
        return Ok(());
    };
    if !app.is_main_admin(sender) {
        dialogue.exit().await?;
        bot.send_message(msg.chat.id, "Faqat asosiy admin o'zgartira oladi.")
            .await?;
        return Ok(());
    }

    let (target, username) = if let Some(user) = msg.forward_from_user() {
        (user_key(user.id), user.username.clone())
    } else {
        let text = msg.text().unwrap_or_default();
        if is_cancel_word(text) {
            dialogue.exit().await?;
            bot.send_message(msg.chat.id, "O'zgarishlar bekor qilindi.").await?;
            return Ok(());
        }
        match parse_admin_input(text) {
            AdminInput::Id(id) => (id, None),
            AdminInput::Username => {
                bot.send_message(
                    msg.chat.id,
                    "@username orqali ID olish uchun foydalanuvchi xabarini forward qiling yoki ID ni kiriting.",
                )
                .await?;
                return Ok(());
            }
            AdminInput::Invalid => {
                bot.send_message(msg.chat.id, "ID yoki @username formatida yuboring.")
                    .await?;
                return Ok(());
            }
        }
    };

    app.db.add_admin(target, username.as_deref()).await?;
    app.db
        .add_log(Some(sender), &format!("admin_add:{target}"))
        .await?;
    info!("Admin {} added by {}", target, sender);
    dialogue.exit().await?;
    bot.send_message(msg.chat.id, "✅ Admin muvaffaqiyatli qo'shildi.")
        .await?;
    Ok(())
}

const REMOVE_ADMIN_TEXT: &str = "❌ <b>Admin o'chirish</b>\n\nO'chirmoqchi bo'lgan adminni tanlang:";

async fn render_remove_view(bot: &Bot, q: &CallbackQuery, app: &AppState) -> HandlerResult {
    let admins = app.db.admins().await?;
    if let Some(target) = callback_target(q) {
        edit_or_send(
            bot,
            target,
            REMOVE_ADMIN_TEXT,
            Some(admin_remove_keyboard(&admins, app.main_admin_id)),
        )
        .await?;
    }
    Ok(())
}

pub(super) async fn show_remove_admins(
    bot: Bot,
    q: CallbackQuery,
    app: Arc<AppState>,
) -> HandlerResult {
    if !ensure_main_admin(&bot, &q, &app, "Faqat asosiy admin o'chira oladi.").await? {
        return Ok(());
    }
    bot.answer_callback_query(q.id.clone()).await?;
    render_remove_view(&bot, &q, &app).await
}

pub(super) async fn remove_admin(
    bot: Bot,
    q: CallbackQuery,
    app: Arc<AppState>,
    user_id: i64,
) -> HandlerResult {
    if !ensure_main_admin(&bot, &q, &app, "Faqat asosiy admin o'chira oladi.").await? {
        return Ok(());
    }
    if app.is_main_admin(user_id) {
        answer(&bot, &q, "Asosiy adminni o'chirish mumkin emas.", true).await?;
        return Ok(());
    }

    app.db.remove_admin(user_id).await?;
    app.db
        .add_log(Some(callback_user(&q)), &format!("admin_remove:{user_id}"))
        .await?;
    info!("Admin {} removed", user_id);
    answer(&bot, &q, "✅ Admin o'chirildi.", true).await?;
    render_remove_view(&bot, &q, &app).await
}

pub(super) async fn show_permission_admins(
    bot: Bot,
    q: CallbackQuery,
    app: Arc<AppState>,
) -> HandlerResult {
    if !ensure_main_admin(&bot, &q, &app, "Faqat asosiy admin huquqlarni boshqara oladi.").await? {
        return Ok(());
    }
    bot.answer_callback_query(q.id.clone()).await?;
    let admins = app.db.admins().await?;
    if let Some(target) = callback_target(&q) {
        edit_or_send(
            &bot,
            target,
            "⚙️ <b>Admin huquqlarini boshqarish</b>\n\nHuquqlarini o'zgartirmoqchi bo'lgan adminni tanlang:",
            Some(permission_admins_keyboard(&admins, app.main_admin_id)),
        )
        .await?;
    }
    Ok(())
}

/// Redraws the permission screen of `user_id`. Returns false when the user
/// is no longer an admin.
async fn render_permissions(
    bot: &Bot,
    q: &CallbackQuery,
    db: &Database,
    user_id: i64,
) -> anyhow::Result<bool> {
    let admins = db.admins().await?;
    let Some(admin) = admins.iter().find(|a| a.user_id == user_id) else {
        return Ok(false);
    };
    let permissions = db.admin_permissions(user_id).await?.unwrap_or_default();

    let mut text = format!("⚙️ <b>Huquqlar: {}</b>\n\n", escape(&admin.label()));
    for permission in AdminPermission::ALL {
        let mark = if permissions.get(permission) { "✅" } else { "❌" };
        let _ = writeln!(text, "{mark} {}", permission.title());
    }

    if let Some(target) = callback_target(q) {
        edit_or_send(
            bot,
            target,
            &text,
            Some(permission_toggle_keyboard(user_id, &permissions)),
        )
        .await?;
    }
    Ok(true)
}

pub(super) async fn show_permissions(
    bot: Bot,
    q: CallbackQuery,
    app: Arc<AppState>,
    user_id: i64,
) -> HandlerResult {
    if !ensure_main_admin(&bot, &q, &app, "Faqat asosiy admin huquqlarni boshqara oladi.").await? {
        return Ok(());
    }
    if render_permissions(&bot, &q, &app.db, user_id).await? {
        bot.answer_callback_query(q.id.clone()).await?;
    } else {
        answer(&bot, &q, "Admin topilmadi", true).await?;
    }
    Ok(())
}

pub(super) async fn toggle_permission(
    bot: Bot,
    q: CallbackQuery,
    app: Arc<AppState>,
    user_id: i64,
    permission: AdminPermission,
    enable: bool,
) -> HandlerResult {
    if !ensure_main_admin(&bot, &q, &app, "Faqat asosiy admin huquqlarni o'zgartira oladi.").await? {
        return Ok(());
    }

    app.db
        .set_admin_permission(user_id, permission, enable)
        .await?;
    app.db
        .add_log(
            Some(callback_user(&q)),
            &format!("admin_perm_update:{user_id}:{permission}:{enable}"),
        )
        .await?;

    let (mark, verdict) = if enable {
        ("✅", "YOQILDI")
    } else {
        ("❌", "O'CHIRILDI")
    };
    answer(
        &bot,
        &q,
        &format!("{mark} {}\n\n{verdict}", permission.title()),
        true,
    )
    .await?;
    render_permissions(&bot, &q, &app.db, user_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn user(id: i64, username: Option<&str>, first_name: Option<&str>) -> UserRecord {
        UserRecord {
            user_id: id,
            username: username.map(str::to_owned),
            first_name: first_name.map(str::to_owned),
            join_date: None,
            last_active: Some(Utc.with_ymd_and_hms(2024, 5, 3, 14, 7, 0).unwrap()),
            downloads_count: 4,
        }
    }

    #[test]
    fn test_backup_failure_text() {
        let missing = StorageError::MissingDatabase("data/bot.db".into());
        assert_eq!(
            backup_failure_text(&missing),
            "❌ Ma'lumotlar bazasida hali ma'lumot yo'q."
        );

        let io = StorageError::Io(std::io::Error::other("disk <full>"));
        assert_eq!(
            backup_failure_text(&io),
            "❌ Zaxira nusxa yaratishda xato: IO error: disk &lt;full&gt;"
        );
    }

    #[test]
    fn test_parse_admin_input() {
        assert_eq!(parse_admin_input(" 12345 "), AdminInput::Id(12345));
        assert_eq!(parse_admin_input("@someone"), AdminInput::Username);
        assert_eq!(parse_admin_input("@"), AdminInput::Invalid);
        assert_eq!(parse_admin_input("-5"), AdminInput::Invalid);
        assert_eq!(parse_admin_input("salom"), AdminInput::Invalid);
        assert_eq!(parse_admin_input("99999999999999999999999"), AdminInput::Invalid);
    }

    #[test]
    fn test_monthly_user_entry() {
        assert_eq!(
            monthly_user_entry(1, &user(7, Some("ali"), Some("Ali"))),
            "1. <a href='tg://user?id=7'>Ali</a> (@ali)\n   📅 <i>03.05 14:07</i> • 📥 <i>4 yuklab olish</i>"
        );
        assert!(monthly_user_entry(2, &user(8, None, None)).contains(">❓ Noma'lum</a>\n"));
    }

    #[test]
    fn test_monthly_users_trimmed_when_long() {
        let long_name = "x".repeat(200);
        let users: Vec<UserRecord> = (0..25)
            .map(|i| user(i, Some("u"), Some(&long_name)))
            .collect();
        let text = render_monthly_users(&users);
        assert!(text.contains("📊 Jami: 25 ta"));
        assert!(text.ends_with("<i>... va boshqalar</i>"));
        assert!(text.contains("\n15. "));
        assert!(!text.contains("\n16. "));

        let short = render_monthly_users(&users[..3]);
        assert!(!short.contains("va boshqalar"));
    }

    #[test]
    fn test_render_admins() {
        assert_eq!(render_admins(&[]), "Adminlar ro'yxati bo'sh.");
        let text = render_admins(&[
            AdminRecord {
                user_id: 1,
                username: Some("boss".into()),
            },
            AdminRecord {
                user_id: 2,
                username: None,
            },
        ]);
        assert!(text.contains("1. <b>@boss</b> - <code>1</code>"));
        assert!(text.contains("2. <b>@nomalum</b> - <code>2</code>"));
    }

    #[test]
    fn test_render_logs() {
        assert_eq!(render_logs(&[]), "📜 Loglar hali yo'q.");
        let text = render_logs(&[LogEntry {
            user_id: None,
            action: "download:<x>".into(),
            created_at: None,
        }]);
        assert!(text.contains("tizim • download:&lt;x&gt;"));
    }

    #[test]
    fn test_check_line() {
        assert_eq!(
            check_line::<String>("Backup tizimi", Ok(())),
            "✅ Backup tizimi - <b>ISHLAYDI</b>"
        );
        assert_eq!(
            check_line("Backup tizimi", Err("disk <full>")),
            "❌ Backup tizimi - <b>XATO:</b> disk &lt;full&gt;"
        );
    }

    #[test]
    fn test_welcome_text_escapes_name() {
        assert!(welcome_text("<Ali>").contains("<b>&lt;Ali&gt;</b>"));
    }
}
