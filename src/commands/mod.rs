//! Command handling module.
//!
//! Typed views of everything a user can send: slash commands, admin
//! reply-keyboard buttons and inline callback payloads.

mod types;

pub use types::{
    AdminButton, BotCommand, CallbackAction, is_cancel_word, normalize_button_url,
    normalize_channel_lookup,
};
