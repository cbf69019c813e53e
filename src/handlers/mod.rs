//! Update routing.
//!
//! Messages are matched in this order: slash commands, admin menu buttons,
//! the pending dialogue step, links to supported platforms, and finally a
//! usage hint. Callback queries are parsed into [`CallbackAction`] and
//! dispatched by variant.

mod admin;
mod broadcast;
mod channels;
mod settings;
pub mod state;
mod user;

use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, LinkPreviewOptions, MessageId};
use tracing::{debug, warn};

pub use state::{BotDialogue, MessageRef, State};

use crate::commands::{AdminButton, BotCommand, CallbackAction};
use crate::config::BotSettings;
use crate::download::{Downloader, extract_supported_url};
use crate::scheduler::ProfileBadge;
use crate::storage::Database;
use crate::telegram::{Bot, user_key};

pub type HandlerResult = anyhow::Result<()>;

/// Shared services handed to every handler.
#[derive(Debug)]
pub struct AppState {
    pub db: Database,
    pub downloader: Downloader,
    pub settings: BotSettings,
    pub main_admin_id: i64,
    pub badge: Arc<ProfileBadge>,
}

impl AppState {
    #[must_use]
    pub const fn is_main_admin(&self, user_id: i64) -> bool {
        user_id == self.main_admin_id
    }
}

/// A supported media link found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLink(pub String);

impl MediaLink {
    /// First supported link in the text, else in the caption.
    #[must_use]
    pub fn find(msg: &Message) -> Option<Self> {
        msg.text()
            .and_then(extract_supported_url)
            .or_else(|| msg.caption().and_then(extract_supported_url))
            .map(|url| Self(url.to_owned()))
    }
}

/// Builds the dispatcher tree.
#[must_use]
pub fn schema() -> UpdateHandler<anyhow::Error> {
    let commands = dptree::entry()
        .filter_command::<BotCommand>()
        .endpoint(command_endpoint);

    let menu_buttons = dptree::filter_map(|msg: Message| msg.text().and_then(AdminButton::parse))
        .endpoint(admin::menu_button);

    let dialogue_steps = dptree::entry()
        .branch(dptree::case![State::ChannelLink].endpoint(channels::receive_channel))
        .branch(dptree::case![State::StartText].endpoint(settings::receive_start_text))
        .branch(dptree::case![State::SubscriptionText].endpoint(settings::receive_subscription_text))
        .branch(dptree::case![State::ShareButtonText].endpoint(settings::receive_share_text))
        .branch(dptree::case![State::ShareButtonUrl].endpoint(settings::receive_share_url))
        .branch(dptree::case![State::AdminUser].endpoint(admin::receive_admin_user))
        .branch(dptree::case![State::BroadcastContent].endpoint(broadcast::receive_content))
        .branch(
            dptree::case![State::BroadcastButtons { source }].endpoint(broadcast::receive_buttons),
        );

    let media_links = dptree::filter_map(|msg: Message| MediaLink::find(&msg)).endpoint(user::download);

    let messages = Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<State>, State>()
        .branch(commands)
        .branch(menu_buttons)
        .branch(dialogue_steps)
        .branch(media_links)
        .endpoint(user::fallback);

    let callbacks = Update::filter_callback_query()
        .enter_dialogue::<CallbackQuery, InMemStorage<State>, State>()
        .endpoint(callback_endpoint);

    dptree::entry().branch(messages).branch(callbacks)
}

async fn command_endpoint(
    bot: Bot,
    msg: Message,
    cmd: BotCommand,
    app: Arc<AppState>,
) -> HandlerResult {
    match cmd {
        BotCommand::Start => user::start(bot, msg, app).await,
        BotCommand::Admin => admin::panel(bot, msg, app).await,
        BotCommand::Backup => admin::backup(bot, msg, app).await,
        BotCommand::Ping | BotCommand::Uptime => admin::ping(bot, msg, app).await,
    }
}

async fn callback_endpoint(
    bot: Bot,
    q: CallbackQuery,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
        warn!("Unknown callback data: {:?}", q.data);
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    debug!("Callback {} from {}", action, q.from.id);

    if action == CallbackAction::CheckSubscription {
        return user::check_subscription(bot, q, app).await;
    }
    if !admin::ensure_admin_callback(&bot, &q, &app).await? {
        return Ok(());
    }

    match action {
        CallbackAction::CheckSubscription => Ok(()),
        CallbackAction::Stats => admin::detailed_stats(bot, q, app).await,

        CallbackAction::ManageChannels | CallbackAction::ChannelsBack => {
            channels::show_management(bot, q, app).await
        }
        CallbackAction::ToggleSubscription => channels::toggle_subscription(bot, q, app).await,
        CallbackAction::ChannelsList => channels::show_list(bot, q, app).await,
        CallbackAction::ChannelDelete => channels::show_delete(bot, q, app).await,
        CallbackAction::ChannelRemove(channel_id) => {
            channels::remove(bot, q, app, channel_id).await
        }
        CallbackAction::ChannelAdd => channels::start_add(bot, q, dialogue).await,
        CallbackAction::EditSubscriptionText => {
            settings::start_subscription_text(bot, q, dialogue, app).await
        }
        CallbackAction::EditSubscriptionCancel => {
            cancel_dialogue(bot, q, dialogue, "🔔 Obuna xabari tahrirlash bekor qilindi.").await
        }
        CallbackAction::EditStartCancel => {
            cancel_dialogue(bot, q, dialogue, "📝 Start matni tahrirlash bekor qilindi.").await
        }

        CallbackAction::ShareToggle => settings::toggle_share(bot, q, app).await,
        CallbackAction::ShareText => settings::start_share_text(bot, q, dialogue, app).await,
        CallbackAction::ShareUrl => settings::start_share_url(bot, q, dialogue, app).await,
        CallbackAction::ShareTextCancel => {
            settings::cancel_share_edit(bot, q, dialogue, app, "✏️ Tugma matnini tahrirlash bekor qilindi.")
                .await
        }
        CallbackAction::ShareUrlCancel => {
            settings::cancel_share_edit(bot, q, dialogue, app, "🔗 Tugma havolasini tahrirlash bekor qilindi.")
                .await
        }
        CallbackAction::ShareBack => settings::close_share(bot, q).await,

        CallbackAction::AdminsList => admin::show_admins(bot, q, app).await,
        CallbackAction::AdminAdd => admin::start_add_admin(bot, q, dialogue, app).await,
        CallbackAction::AdminRemoveSelect => admin::show_remove_admins(bot, q, app).await,
        CallbackAction::AdminRemove(user_id) => admin::remove_admin(bot, q, app, user_id).await,
        CallbackAction::PermissionsSelect => admin::show_permission_admins(bot, q, app).await,
        CallbackAction::PermissionManage(user_id) => {
            admin::show_permissions(bot, q, app, user_id).await
        }
        CallbackAction::PermissionToggle {
            user_id,
            permission,
            enable,
        } => admin::toggle_permission(bot, q, app, user_id, permission, enable).await,
        CallbackAction::BackToAdminMenu => admin::show_admin_menu(bot, q).await,

        CallbackAction::BroadcastConfirm => broadcast::confirm(bot, q, dialogue, app).await,
        CallbackAction::BroadcastRetry => broadcast::retry(bot, q, dialogue).await,
        CallbackAction::BroadcastCancel => broadcast::cancel(bot, q, dialogue).await,
    }
}

/// Leaves the current dialogue and replaces the prompt with `text`.
async fn cancel_dialogue(
    bot: Bot,
    q: CallbackQuery,
    dialogue: BotDialogue,
    text: &str,
) -> HandlerResult {
    dialogue.exit().await?;
    bot.answer_callback_query(q.id.clone()).text("Bekor qilindi").await?;
    if let Some(target) = callback_target(&q) {
        edit_or_send(&bot, target, text, None).await?;
    }
    Ok(())
}

/// Link previews off.
#[must_use]
pub fn no_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

/// The message a callback button belongs to.
#[must_use]
pub fn callback_target(q: &CallbackQuery) -> Option<(ChatId, MessageId)> {
    q.message.as_ref().map(|m| (m.chat().id, m.id()))
}

/// Database key of the user who pressed a button.
#[must_use]
pub fn callback_user(q: &CallbackQuery) -> i64 {
    user_key(q.from.id)
}

/// Edits the message in place, sending a new one when editing fails.
pub async fn edit_or_send(
    bot: &Bot,
    (chat, message_id): (ChatId, MessageId),
    text: &str,
    markup: Option<InlineKeyboardMarkup>,
) -> HandlerResult {
    let mut edit = bot
        .edit_message_text(chat, message_id, text)
        .link_preview_options(no_preview());
    if let Some(markup) = markup.clone() {
        edit = edit.reply_markup(markup);
    }
    if let Err(e) = edit.await {
        debug!("Edit failed, sending a new message: {}", e);
        send_with_markup(bot, chat, text, markup).await?;
    }
    Ok(())
}

/// Sends `text` with an optional inline keyboard and no link previews.
pub async fn send_with_markup(
    bot: &Bot,
    chat: ChatId,
    text: &str,
    markup: Option<InlineKeyboardMarkup>,
) -> HandlerResult {
    let mut send = bot.send_message(chat, text).link_preview_options(no_preview());
    if let Some(markup) = markup {
        send = send.reply_markup(markup);
    }
    send.await?;
    Ok(())
}

/// Toast or alert answer to a callback.
pub async fn answer(bot: &Bot, q: &CallbackQuery, text: &str, alert: bool) -> HandlerResult {
    bot.answer_callback_query(q.id.clone())
        .text(text)
        .show_alert(alert)
        .await?;
    Ok(())
}

/// Deletes a message, ignoring failures.
pub async fn delete_quietly(bot: &Bot, target: MessageRef) {
    if let Err(e) = bot.delete_message(target.chat, target.id).await {
        debug!("Message {} not deleted: {}", target.id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_preview_disables_previews() {
        assert!(no_preview().is_disabled);
    }

    #[test]
    fn test_schema_builds() {
        let _ = schema();
    }
}
