//! Bot API wire types and their conversion to inbound events

use crate::chat::{
    Actor, ButtonPress, ChatKind, Conversation, InboundEvent, InlineKeyboard, MemberStatus,
    MembershipChange, SendOptions, TextFormat, TextMessage, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope around every Bot API reply
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
    #[serde(default)]
    pub new_chat_members: Vec<User>,
    #[serde(default)]
    pub left_chat_member: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ChatKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl From<User> for Actor {
    fn from(user: User) -> Self {
        Actor {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            username: user.username,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
}

impl ChatMember {
    pub fn member_status(&self) -> MemberStatus {
        match self.status.as_str() {
            "creator" => MemberStatus::Creator,
            "administrator" => MemberStatus::Administrator,
            "restricted" => MemberStatus::Restricted,
            "left" => MemberStatus::Left,
            "kicked" => MemberStatus::Kicked,
            _ => MemberStatus::Member,
        }
    }
}

// ============================================================================
// Inbound conversion
// ============================================================================

/// Turn an update into an engine event. Updates the engine has no use for
/// (stickers, edits, channel posts, presses on vanished messages) yield None.
pub fn into_event(update: Update, bot_id: UserId) -> Option<InboundEvent> {
    if let Some(query) = update.callback_query {
        let message = query.message?;
        return Some(InboundEvent::Button(ButtonPress {
            conversation: conversation(&message.chat),
            actor: query.from.into(),
            interaction_id: query.id,
            message_id: message.message_id,
            payload: query.data.unwrap_or_default(),
        }));
    }

    let message = update.message?;
    let conversation = conversation(&message.chat);

    if !message.new_chat_members.is_empty() || message.left_chat_member.is_some() {
        let bot_removed = message
            .left_chat_member
            .as_ref()
            .is_some_and(|u| u.id == bot_id);
        let joined: Vec<Actor> = message
            .new_chat_members
            .into_iter()
            .filter(|u| !u.is_bot)
            .map(Actor::from)
            .collect();
        if joined.is_empty() && !bot_removed {
            return None;
        }
        return Some(InboundEvent::Membership(MembershipChange {
            conversation,
            joined,
            bot_removed,
        }));
    }

    let text = message.text?;
    let actor = message.from?;
    Some(InboundEvent::Text(TextMessage {
        conversation,
        actor: actor.into(),
        message_id: message.message_id,
        text,
        reply_to: message.reply_to_message.map(|m| m.message_id),
    }))
}

fn conversation(chat: &Chat) -> Conversation {
    Conversation {
        id: chat.id,
        kind: chat.kind,
    }
}

// ============================================================================
// Outbound rendering
// ============================================================================

#[derive(Debug, Serialize)]
struct WireButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

fn inline_keyboard(keyboard: &InlineKeyboard) -> Value {
    let rows: Vec<Vec<WireButton<'_>>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| WireButton {
                    text: &b.text,
                    callback_data: &b.payload,
                })
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Fill the formatting and markup fields shared by send and edit
fn apply_options(body: &mut Value, opts: &SendOptions, allow_force_reply: bool) {
    if opts.format == TextFormat::Markdown {
        body["parse_mode"] = json!("Markdown");
    }
    if let Some(keyboard) = &opts.keyboard {
        body["reply_markup"] = inline_keyboard(keyboard);
    } else if opts.force_reply && allow_force_reply {
        body["reply_markup"] = json!({ "force_reply": true, "selective": true });
    }
}

/// `sendMessage` body
pub fn send_body(chat: i64, text: &str, opts: &SendOptions) -> Value {
    let mut body = json!({ "chat_id": chat, "text": text });
    if let Some(reply_to) = opts.reply_to {
        body["reply_parameters"] = json!({
            "message_id": reply_to,
            "allow_sending_without_reply": true,
        });
    }
    apply_options(&mut body, opts, true);
    body
}

/// `editMessageText` body; edits cannot carry a forced reply
pub fn edit_body(chat: i64, message_id: i64, text: &str, opts: &SendOptions) -> Value {
    let mut body = json!({ "chat_id": chat, "message_id": message_id, "text": text });
    apply_options(&mut body, opts, false);
    body
}
