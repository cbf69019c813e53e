//! Per-chat dialogue state for multi-step admin flows.

use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};
use teloxide::types::{ChatId, Message, MessageId};

use crate::broadcast::LinkButton;

/// A message the bot refers back to later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat: ChatId,
    pub id: MessageId,
}

impl From<&Message> for MessageRef {
    fn from(msg: &Message) -> Self {
        Self {
            chat: msg.chat.id,
            id: msg.id,
        }
    }
}

/// What the next plain message from an admin means.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    Idle,
    ChannelLink,
    StartText,
    SubscriptionText,
    ShareButtonText,
    ShareButtonUrl,
    AdminUser,
    BroadcastContent,
    BroadcastButtons {
        source: MessageRef,
    },
    BroadcastConfirm {
        source: MessageRef,
        buttons: Vec<Vec<LinkButton>>,
        preview: MessageRef,
    },
}

impl State {
    /// Preview copy that must be deleted when the broadcast flow ends.
    #[must_use]
    pub const fn broadcast_preview(&self) -> Option<MessageRef> {
        match self {
            Self::BroadcastConfirm { preview, .. } => Some(*preview),
            _ => None,
        }
    }
}

pub type BotDialogue = Dialogue<State, InMemStorage<State>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_preview() {
        let preview = MessageRef {
            chat: ChatId(1),
            id: MessageId(10),
        };
        let state = State::BroadcastConfirm {
            source: MessageRef {
                chat: ChatId(1),
                id: MessageId(9),
            },
            buttons: Vec::new(),
            preview,
        };
        assert_eq!(state.broadcast_preview(), Some(preview));
        assert_eq!(State::Idle.broadcast_preview(), None);
        assert_eq!(State::default(), State::Idle);
    }
}
