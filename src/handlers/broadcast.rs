//! Admin side of the broadcast flow: content, buttons, preview, confirmation.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info};

use super::{
    AppState, BotDialogue, HandlerResult, MessageRef, State, answer, callback_target,
    callback_user, delete_quietly, edit_or_send, send_with_markup,
};
use crate::broadcast::{
    BUTTONS_INSTRUCTIONS, BroadcastRequest, buttons_markup, is_skip_word, parse_buttons,
    run_broadcast,
};
use crate::commands::{CallbackAction, is_cancel_word};
use crate::telegram::Bot;
use crate::telegram::keyboards::{broadcast_confirm_keyboard, cancel_keyboard};

const CONTENT_PROMPT: &str = "📨 <b>Ommaviy xabar yuborish</b>\n\n\
    Foydalanuvchilarga yuboriladigan xabarni yuboring. Matn, rasm, video yoki \
    boshqa turdagi xabar bo'lishi mumkin.\n\n\
    ❗ Bekor qilish uchun pastdagi tugmani bosing yoki 'Bekor' deb yozing.";

const CANCELLED: &str = "✅ Jo'natish bekor qilindi.";

pub(super) async fn start(bot: Bot, msg: Message, dialogue: BotDialogue) -> HandlerResult {
    dialogue.update(State::BroadcastContent).await?;
    send_with_markup(
        &bot,
        msg.chat.id,
        CONTENT_PROMPT,
        Some(cancel_keyboard(&CallbackAction::BroadcastCancel)),
    )
    .await
}

/// Any message becomes the broadcast source; it is copied later, not stored.
pub(super) async fn receive_content(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    if !super::admin::ensure_admin_message(&bot, &msg, &app).await? {
        dialogue.exit().await?;
        return Ok(());
    }
    if msg.text().is_some_and(is_cancel_word) {
        dialogue.exit().await?;
        bot.send_message(msg.chat.id, CANCELLED).await?;
        return Ok(());
    }

    dialogue
        .update(State::BroadcastButtons {
            source: MessageRef::from(&msg),
        })
        .await?;
    bot.send_message(msg.chat.id, BUTTONS_INSTRUCTIONS).await?;
    Ok(())
}

pub(super) async fn receive_buttons(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    source: MessageRef,
    app: Arc<AppState>,
) -> HandlerResult {
    if !super::admin::ensure_admin_message(&bot, &msg, &app).await? {
        dialogue.exit().await?;
        return Ok(());
    }
    let text = msg.text().unwrap_or_default();
    if is_cancel_word(text) {
        dialogue.exit().await?;
        bot.send_message(msg.chat.id, CANCELLED).await?;
        return Ok(());
    }

    let buttons = if is_skip_word(text) {
        Vec::new()
    } else {
        match parse_buttons(text) {
            Ok(rows) => rows,
            Err(e) => {
                bot.send_message(msg.chat.id, e.to_string()).await?;
                return Ok(());
            }
        }
    };

    let mut request = bot.copy_message(msg.chat.id, source.chat, source.id);
    if let Some(markup) = buttons_markup(&buttons) {
        request = request.reply_markup(markup);
    }
    let preview = match request.await {
        Ok(id) => MessageRef {
            chat: msg.chat.id,
            id,
        },
        Err(e) => {
            error!("Broadcast preview failed: {}", e);
            bot.send_message(
                msg.chat.id,
                "Xabarni ko'rsatib bo'lmadi. Iltimos, qaytadan urinib ko'ring.",
            )
            .await?;
            return Ok(());
        }
    };

    dialogue
        .update(State::BroadcastConfirm {
            source,
            buttons,
            preview,
        })
        .await?;
    send_with_markup(
        &bot,
        msg.chat.id,
        "Yuqoridagi xabar barcha foydalanuvchilarga yuboriladi. Tasdiqlaysizmi?",
        Some(broadcast_confirm_keyboard()),
    )
    .await
}

pub(super) async fn confirm(
    bot: Bot,
    q: CallbackQuery,
    dialogue: BotDialogue,
    app: Arc<AppState>,
) -> HandlerResult {
    let Some(State::BroadcastConfirm {
        source,
        buttons,
        preview,
    }) = dialogue.get().await?
    else {
        return answer(&bot, &q, "Tasdiqlash uchun xabar topilmadi.", true).await;
    };

    delete_quietly(&bot, preview).await;
    dialogue.exit().await?;
    if let Some(target) = callback_target(&q) {
        edit_or_send(&bot, target, "📨 Jo'natish boshlandi...", None).await?;
    }
    answer(&bot, &q, "Jo'natish boshlandi.", false).await?;

    let request = BroadcastRequest {
        admin_chat: callback_target(&q).map_or(preview.chat, |(chat, _)| chat),
        source_chat: source.chat,
        source_message: source.id,
        markup: buttons_markup(&buttons),
        initiator: Some(callback_user(&q)),
    };
    info!("Broadcast confirmed by {}", callback_user(&q));
    let db = app.db.clone();
    tokio::spawn(async move {
        if let Err(e) = run_broadcast(bot, db, request).await {
            error!("Broadcast aborted: {}", e);
        }
    });
    Ok(())
}

/// Back to the buttons step with the same source message.
pub(super) async fn retry(bot: Bot, q: CallbackQuery, dialogue: BotDialogue) -> HandlerResult {
    let Some(State::BroadcastConfirm {
        source, preview, ..
    }) = dialogue.get().await?
    else {
        return answer(&bot, &q, "Hozir qayta kiritish mumkin emas.", true).await;
    };

    delete_quietly(&bot, preview).await;
    dialogue.update(State::BroadcastButtons { source }).await?;
    answer(&bot, &q, "Tugmalarni qayta kiriting.", false).await?;
    if let Some(target) = callback_target(&q) {
        edit_or_send(
            &bot,
            target,
            &format!("♻️ Tugmalarni qayta kiriting.\n\n{BUTTONS_INSTRUCTIONS}"),
            None,
        )
        .await?;
    }
    Ok(())
}

pub(super) async fn cancel(bot: Bot, q: CallbackQuery, dialogue: BotDialogue) -> HandlerResult {
    if let Some(preview) = dialogue.get().await?.and_then(|s| s.broadcast_preview()) {
        delete_quietly(&bot, preview).await;
    }
    dialogue.exit().await?;
    if let Some(target) = callback_target(&q) {
        edit_or_send(&bot, target, "📨 Jo'natish bekor qilindi.", None).await?;
    }
    answer(&bot, &q, "Jarayon bekor qilindi.", false).await
}
