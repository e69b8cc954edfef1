//! Single live menu message per conversation

use crate::chat::{ChatId, MessageId};
use crate::runtime::{ChatTransport, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

/// Storage for the active menu message id of each conversation
#[async_trait]
pub trait ActiveMessageStore: Send + Sync {
    async fn active(&self, conversation: ChatId) -> Option<MessageId>;

    /// Record `message_id` as active, returning the id it replaced
    async fn replace(&self, conversation: ChatId, message_id: MessageId) -> Option<MessageId>;

    async fn clear(&self, conversation: ChatId);
}

#[derive(Debug, Default)]
pub struct InMemoryActiveMessages {
    active: Mutex<HashMap<ChatId, MessageId>>,
}

impl InMemoryActiveMessages {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActiveMessageStore for InMemoryActiveMessages {
    async fn active(&self, conversation: ChatId) -> Option<MessageId> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&conversation)
            .copied()
    }

    async fn replace(&self, conversation: ChatId, message_id: MessageId) -> Option<MessageId> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation, message_id)
    }

    async fn clear(&self, conversation: ChatId) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&conversation);
    }
}

/// Keeps exactly zero or one interactive root menu per conversation
#[derive(Clone)]
pub struct ActiveMessageTracker {
    store: Arc<dyn ActiveMessageStore>,
}

impl ActiveMessageTracker {
    pub fn new(store: Arc<dyn ActiveMessageStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryActiveMessages::new()))
    }

    /// Delete the previous root menu (best-effort), render a new one and
    /// record it as the active message.
    pub async fn publish<T, F, Fut>(
        &self,
        transport: &T,
        conversation: ChatId,
        render: F,
    ) -> Result<MessageId, TransportError>
    where
        T: ChatTransport + ?Sized,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<MessageId, TransportError>> + Send,
    {
        let prior = self.store.active(conversation).await;
        if let Some(prior) = prior {
            delete_quietly(transport, conversation, prior).await;
        }

        let message_id = render().await?;

        // A concurrent publish may have recorded its own menu in between
        let replaced = self.store.replace(conversation, message_id).await;
        if let Some(replaced) = replaced {
            if Some(replaced) != prior && replaced != message_id {
                delete_quietly(transport, conversation, replaced).await;
            }
        }

        tracing::debug!(chat_id = conversation, message_id, "Published root menu");
        Ok(message_id)
    }

    /// Make an already-sent message the active one without deleting the
    /// previous menu (its content has been repurposed and has no buttons)
    pub async fn adopt(&self, conversation: ChatId, message_id: MessageId) {
        self.store.replace(conversation, message_id).await;
    }

    /// True if another message is recorded as active. Conversations without
    /// a recorded menu have nothing to supersede, so nothing is stale there.
    pub async fn is_stale(&self, conversation: ChatId, message_id: MessageId) -> bool {
        self.store
            .active(conversation)
            .await
            .is_some_and(|active| active != message_id)
    }

    pub async fn active(&self, conversation: ChatId) -> Option<MessageId> {
        self.store.active(conversation).await
    }

    pub async fn forget(&self, conversation: ChatId) {
        self.store.clear(conversation).await;
    }
}

/// Best-effort delete; failures are logged and swallowed
pub async fn delete_quietly<T: ChatTransport + ?Sized>(
    transport: &T,
    conversation: ChatId,
    message_id: MessageId,
) {
    if let Err(e) = transport.delete_message(conversation, message_id).await {
        tracing::debug!(
            chat_id = conversation,
            message_id,
            error = %e,
            "Could not delete message"
        );
    }
}
