//! Chat-level vocabulary shared by the engine and the transport
//!
//! Identifiers are opaque to the engine; they are only compared and echoed
//! back to the transport.

use serde::{Deserialize, Serialize};

pub type ChatId = i64;
pub type UserId = i64;
pub type MessageId = i64;

/// Kind of conversation an event arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_group(self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

/// Addressable chat context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversation {
    pub id: ChatId,
    pub kind: ChatKind,
}

#[cfg(test)]
impl Conversation {
    pub fn private(id: ChatId) -> Self {
        Self {
            id,
            kind: ChatKind::Private,
        }
    }

    pub fn group(id: ChatId) -> Self {
        Self {
            id,
            kind: ChatKind::Supergroup,
        }
    }
}

/// The user behind an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl Actor {
    pub fn new(id: UserId, first_name: impl Into<String>) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: None,
            username: None,
        }
    }

    pub fn display_name(&self) -> String {
        full_name(&self.first_name, self.last_name.as_deref())
    }
}

pub fn full_name(first: &str, last: Option<&str>) -> String {
    match last {
        Some(last) if !last.is_empty() => format!("{first} {last}"),
        _ => first.to_string(),
    }
}

// ============================================================================
// Inbound events
// ============================================================================

/// A text message, possibly a reply to an earlier message
#[derive(Debug, Clone)]
pub struct TextMessage {
    pub conversation: Conversation,
    pub actor: Actor,
    pub message_id: MessageId,
    pub text: String,
    pub reply_to: Option<MessageId>,
}

/// An inline button press
#[derive(Debug, Clone)]
pub struct ButtonPress {
    pub conversation: Conversation,
    pub actor: Actor,
    pub interaction_id: String,
    pub message_id: MessageId,
    pub payload: String,
}

/// Users joining or leaving a group
#[derive(Debug, Clone)]
pub struct MembershipChange {
    pub conversation: Conversation,
    pub joined: Vec<Actor>,
    /// Set when the bot itself was removed from the conversation
    pub bot_removed: bool,
}

/// Every event the dispatcher accepts
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Text(TextMessage),
    Button(ButtonPress),
    Membership(MembershipChange),
}

impl InboundEvent {
    pub fn conversation(&self) -> Conversation {
        match self {
            InboundEvent::Text(m) => m.conversation,
            InboundEvent::Button(b) => b.conversation,
            InboundEvent::Membership(c) => c.conversation,
        }
    }
}

// ============================================================================
// Outbound rendering
// ============================================================================

/// Text formatting mode for outbound messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Plain,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub payload: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            payload: payload.into(),
        }
    }
}

/// Rows of inline buttons
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row holding a single button
    #[must_use]
    pub fn button(mut self, text: impl Into<String>, payload: impl Into<String>) -> Self {
        self.rows.push(vec![InlineButton::new(text, payload)]);
        self
    }

    #[must_use]
    pub fn row(mut self, row: Vec<InlineButton>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn push_row(&mut self, row: Vec<InlineButton>) {
        self.rows.push(row);
    }

    #[cfg(test)]
    pub fn payloads(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(|b| b.payload.as_str())
    }
}

/// Options for send/edit calls
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendOptions {
    pub reply_to: Option<MessageId>,
    pub keyboard: Option<InlineKeyboard>,
    pub format: TextFormat,
    /// Ask the client to open a reply to this message; ignored when an
    /// inline keyboard is attached
    pub force_reply: bool,
}

impl SendOptions {
    pub fn markdown() -> Self {
        Self {
            format: TextFormat::Markdown,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn reply_to(mut self, message_id: MessageId) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    #[must_use]
    pub fn keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    #[must_use]
    pub fn force_reply(mut self) -> Self {
        self.force_reply = true;
        self
    }
}

/// Acknowledgement payload for an interaction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Acknowledgement {
    pub text: Option<String>,
    pub alert: bool,
}

impl Acknowledgement {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn toast(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            alert: false,
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            alert: true,
        }
    }
}

/// Membership status of a user in a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MemberStatus {
    pub fn is_privileged(self) -> bool {
        matches!(self, MemberStatus::Creator | MemberStatus::Administrator)
    }
}
