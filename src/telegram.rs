//! Telegram Bot API transport
//!
//! Long-polls `getUpdates` for inbound events and implements
//! [`ChatTransport`] on top of the JSON methods.

pub mod types;

use crate::chat::{
    Acknowledgement, ChatId, InboundEvent, MemberStatus, MessageId, SendOptions, UserId,
};
use crate::runtime::{ChatTransport, EventSource, TransportError};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use types::{ApiResponse, ChatMember, Update};

const API_BASE: &str = "https://api.telegram.org";

/// Map a Bot API failure to the transport taxonomy
fn classify(code: i64, description: &str) -> TransportError {
    let lower = description.to_lowercase();
    if lower.contains("message is not modified") {
        TransportError::NotModified
    } else if lower.contains("not found") || lower.contains("message can't be deleted") {
        TransportError::NotFound
    } else {
        TransportError::Api {
            code,
            description: description.to_string(),
        }
    }
}

pub struct TelegramClient {
    client: Client,
    base_url: String,
    username: String,
    bot_id: UserId,
    poll_timeout: Duration,
    /// Next `getUpdates` offset
    offset: AtomicI64,
}

impl TelegramClient {
    /// Resolve the bot's identity with `getMe`
    pub async fn connect(token: &str, poll_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            // Must outlive the long poll
            .timeout(poll_timeout + Duration::from_secs(15))
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {e}")))?;

        let mut bot = Self {
            client,
            base_url: format!("{API_BASE}/bot{token}"),
            username: String::new(),
            bot_id: 0,
            poll_timeout,
            offset: AtomicI64::new(0),
        };
        let me: types::User = bot.call("getMe", &json!({})).await?;
        bot.username = me.username.unwrap_or_default();
        bot.bot_id = me.id;
        tracing::info!(bot_id = me.id, username = %bot.username, "Connected to Telegram");
        Ok(bot)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                // Never log the URL; it carries the token
                TransportError::Network(e.without_url().to_string())
            })?;

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;
        let parsed: ApiResponse<T> = serde_json::from_str(&body)
            .map_err(|e| TransportError::Decode(format!("{method}: {e}")))?;

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                ok: true,
                result: None,
                ..
            } => Err(TransportError::Decode(format!("{method}: missing result"))),
            ApiResponse {
                error_code,
                description,
                ..
            } => Err(classify(
                error_code.unwrap_or_default(),
                description.as_deref().unwrap_or("unknown error"),
            )),
        }
    }

    /// Fetch the next batch of updates and advance the offset past them
    pub async fn get_updates(&self) -> Result<Vec<Update>, TransportError> {
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &json!({
                    "offset": self.offset.load(Ordering::SeqCst),
                    "timeout": self.poll_timeout.as_secs(),
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;
        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.store(last + 1, Ordering::SeqCst);
        }
        Ok(updates)
    }
}

#[async_trait]
impl EventSource for TelegramClient {
    async fn next_batch(&self) -> Result<Vec<InboundEvent>, TransportError> {
        let updates = self.get_updates().await?;
        Ok(updates
            .into_iter()
            .filter_map(|u| types::into_event(u, self.bot_id))
            .collect())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageId, TransportError> {
        let sent: types::Message = self
            .call("sendMessage", &types::send_body(chat, text, &opts))
            .await?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        opts: SendOptions,
    ) -> Result<(), TransportError> {
        // Returns the edited message, or `true` for inline messages
        let _: Value = self
            .call(
                "editMessageText",
                &types::edit_body(chat, message_id, text, &opts),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": chat, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    async fn answer_interaction(
        &self,
        interaction_id: &str,
        ack: Acknowledgement,
    ) -> Result<(), TransportError> {
        let mut body = json!({
            "callback_query_id": interaction_id,
            "show_alert": ack.alert,
        });
        if let Some(text) = ack.text {
            body["text"] = json!(text);
        }
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    async fn member_status(
        &self,
        chat: ChatId,
        user: UserId,
    ) -> Result<MemberStatus, TransportError> {
        let member: ChatMember = self
            .call("getChatMember", &json!({ "chat_id": chat, "user_id": user }))
            .await?;
        Ok(member.member_status())
    }

    fn bot_username(&self) -> &str {
        &self.username
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_edit_and_delete_failures() {
        assert_eq!(
            classify(
                400,
                "Bad Request: message is not modified: \
                 specified new message content is exactly the same"
            ),
            TransportError::NotModified
        );
        assert_eq!(
            classify(400, "Bad Request: message to delete not found"),
            TransportError::NotFound
        );
        assert_eq!(
            classify(400, "Bad Request: message to edit not found"),
            TransportError::NotFound
        );
        assert!(classify(400, "Bad Request: message can't be deleted for everyone").is_transient());
    }

    #[test]
    fn test_classify_other_failures() {
        let err = classify(403, "Forbidden: bot was blocked by the user");
        assert!(!err.is_transient());
        assert_eq!(
            err,
            TransportError::Api {
                code: 403,
                description: "Forbidden: bot was blocked by the user".to_string()
            }
        );
    }

    #[test]
    fn test_error_envelope_parses() {
        let parsed: ApiResponse<Value> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.error_code, Some(400));
        assert!(parsed.result.is_none());
    }
}
