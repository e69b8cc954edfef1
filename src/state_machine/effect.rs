//! Effects produced by wizard transitions

use super::state::{SessionUpdate, ShelterDraft};
use crate::chat::{InlineKeyboard, MessageId};

/// Effects to be executed after a transition, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send the next prompt, then rotate the session onto it and apply `update`
    SendPrompt {
        text: String,
        /// Suggestion buttons; without them the prompt asks for a reply
        keyboard: Option<InlineKeyboard>,
        reply_to: Option<MessageId>,
        update: SessionUpdate,
    },

    /// Best-effort removal of a message (e.g. a used suggestion keyboard)
    DeleteMessage { message_id: MessageId },

    /// Every field is collected; persist and close the session
    Finalize(ShelterDraft),
}

impl Effect {
    pub fn prompt(text: impl Into<String>, update: SessionUpdate) -> Self {
        Effect::SendPrompt {
            text: text.into(),
            keyboard: None,
            reply_to: None,
            update,
        }
    }

    pub fn suggestions(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Effect::SendPrompt {
            text: text.into(),
            keyboard: Some(keyboard),
            reply_to: None,
            update: SessionUpdate::default(),
        }
    }

    /// Attach a reply target to a prompt; other effects are unchanged
    #[must_use]
    pub fn replying_to(self, message_id: MessageId) -> Self {
        match self {
            Effect::SendPrompt {
                text,
                keyboard,
                update,
                ..
            } => Effect::SendPrompt {
                text,
                keyboard,
                reply_to: Some(message_id),
                update,
            },
            other => other,
        }
    }
}
