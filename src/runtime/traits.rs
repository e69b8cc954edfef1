//! Trait abstractions for the bot's I/O collaborators
//!
//! These traits let the dispatcher run against mock implementations.

use crate::chat::{Acknowledgement, Actor, ChatId, MemberStatus, MessageId, SendOptions, UserId};
use crate::content::{ContentError, Evaluation};
use crate::db::{DonationOutcome, NewShelter, PurchaseOutcome, Shelter, ShopItem, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure reported by the chat platform
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Message is not modified")]
    NotModified,
    #[error("Message not found")]
    NotFound,
    #[error("Platform error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unreadable platform response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Edit/delete outcomes that are swallowed and never retried
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::NotModified | TransportError::NotFound)
    }
}

/// Persistence failure; surfaced to users only as a generic apology
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Storage error: {0}")]
pub struct StoreError(pub String);

impl From<crate::db::DbError> for StoreError {
    fn from(e: crate::db::DbError) -> Self {
        StoreError(e.to_string())
    }
}

/// Messaging platform operations the bot needs
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageId, TransportError>;

    async fn edit_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        opts: SendOptions,
    ) -> Result<(), TransportError>;

    async fn delete_message(&self, chat: ChatId, message_id: MessageId)
        -> Result<(), TransportError>;

    /// Must be called at most once per interaction
    async fn answer_interaction(
        &self,
        interaction_id: &str,
        ack: Acknowledgement,
    ) -> Result<(), TransportError>;

    async fn member_status(&self, chat: ChatId, user: UserId)
        -> Result<MemberStatus, TransportError>;

    /// Username used to recognise `/command@botname`
    fn bot_username(&self) -> &str;
}

/// Player, shelter and shop records
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn user_exists(&self, id: UserId) -> Result<bool, StoreError>;
    async fn upsert_user(&self, actor: &Actor) -> Result<(), StoreError>;
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn set_user_shelter(&self, id: UserId, shelter: Option<ChatId>)
        -> Result<bool, StoreError>;

    async fn get_shelter(&self, id: ChatId) -> Result<Option<Shelter>, StoreError>;
    async fn upsert_shelter(&self, shelter: &NewShelter) -> Result<(), StoreError>;
    /// Detaches members, then deletes; returns the number detached
    async fn delete_shelter(&self, id: ChatId) -> Result<usize, StoreError>;
    async fn shelter_members(&self, id: ChatId) -> Result<Vec<User>, StoreError>;
    async fn possible_shelters(&self, user: UserId) -> Result<Vec<Shelter>, StoreError>;
    async fn add_possible_shelter(&self, user: UserId, shelter: ChatId)
        -> Result<bool, StoreError>;

    async fn donate_coins(
        &self,
        user: UserId,
        shelter: ChatId,
        amount: i64,
    ) -> Result<DonationOutcome, StoreError>;
    async fn donate_supplies(
        &self,
        user: UserId,
        shelter: ChatId,
        item: &str,
        quantity: i64,
    ) -> Result<DonationOutcome, StoreError>;

    async fn shop_items(&self) -> Result<Vec<ShopItem>, StoreError>;
    async fn purchase(&self, user: UserId, item_id: i64) -> Result<PurchaseOutcome, StoreError>;

    async fn record_survival_score(
        &self,
        user: UserId,
        scenario_average: f64,
    ) -> Result<Option<f64>, StoreError>;
}

/// Per-actor record of generated scenarios
#[async_trait]
pub trait QuestionHistory: Send + Sync {
    async fn purge_older_than(
        &self,
        user: UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
    /// Newest first
    async fn recent(&self, user: UserId, limit: usize) -> Result<Vec<String>, StoreError>;
    async fn record(&self, user: UserId, question: &str) -> Result<(), StoreError>;
    async fn trim_to(&self, user: UserId, keep: usize) -> Result<usize, StoreError>;
    async fn clear_all(&self) -> Result<usize, StoreError>;
}

/// Scenario generation and answer grading
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    fn is_available(&self) -> bool;

    /// `None` means every credential is exhausted
    async fn generate(&self, actor: &Actor) -> Result<Option<String>, ContentError>;

    /// `None` means the grader produced nothing usable
    async fn evaluate(&self, scenario: &str, answer: &str)
        -> Result<Option<Evaluation>, ContentError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageId, TransportError> {
        (**self).send_message(chat, text, opts).await
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        opts: SendOptions,
    ) -> Result<(), TransportError> {
        (**self).edit_message(chat, message_id, text, opts).await
    }

    async fn delete_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        (**self).delete_message(chat, message_id).await
    }

    async fn answer_interaction(
        &self,
        interaction_id: &str,
        ack: Acknowledgement,
    ) -> Result<(), TransportError> {
        (**self).answer_interaction(interaction_id, ack).await
    }

    async fn member_status(
        &self,
        chat: ChatId,
        user: UserId,
    ) -> Result<MemberStatus, TransportError> {
        (**self).member_status(chat, user).await
    }

    fn bot_username(&self) -> &str {
        (**self).bot_username()
    }
}

#[async_trait]
impl<T: ContentGenerator + ?Sized> ContentGenerator for Arc<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    async fn generate(&self, actor: &Actor) -> Result<Option<String>, ContentError> {
        (**self).generate(actor).await
    }

    async fn evaluate(
        &self,
        scenario: &str,
        answer: &str,
    ) -> Result<Option<Evaluation>, ContentError> {
        (**self).evaluate(scenario, answer).await
    }
}

#[async_trait]
impl<T: QuestionHistory + ?Sized> QuestionHistory for Arc<T> {
    async fn purge_older_than(
        &self,
        user: UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        (**self).purge_older_than(user, cutoff).await
    }

    async fn recent(&self, user: UserId, limit: usize) -> Result<Vec<String>, StoreError> {
        (**self).recent(user, limit).await
    }

    async fn record(&self, user: UserId, question: &str) -> Result<(), StoreError> {
        (**self).record(user, question).await
    }

    async fn trim_to(&self, user: UserId, keep: usize) -> Result<usize, StoreError> {
        (**self).trim_to(user, keep).await
    }

    async fn clear_all(&self) -> Result<usize, StoreError> {
        (**self).clear_all().await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

use crate::db::Database;
use std::sync::Arc;

/// Adapter to use Database as GameStore and QuestionHistory
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GameStore for DatabaseStore {
    async fn user_exists(&self, id: UserId) -> Result<bool, StoreError> {
        Ok(self.db.user_exists(id)?)
    }

    async fn upsert_user(&self, actor: &Actor) -> Result<(), StoreError> {
        Ok(self.db.upsert_user(actor)?)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.db.get_user(id)?)
    }

    async fn set_user_shelter(
        &self,
        id: UserId,
        shelter: Option<ChatId>,
    ) -> Result<bool, StoreError> {
        Ok(self.db.set_user_shelter(id, shelter)?)
    }

    async fn get_shelter(&self, id: ChatId) -> Result<Option<Shelter>, StoreError> {
        Ok(self.db.get_shelter(id)?)
    }

    async fn upsert_shelter(&self, shelter: &NewShelter) -> Result<(), StoreError> {
        Ok(self.db.upsert_shelter(shelter)?)
    }

    async fn delete_shelter(&self, id: ChatId) -> Result<usize, StoreError> {
        Ok(self.db.delete_shelter(id)?)
    }

    async fn shelter_members(&self, id: ChatId) -> Result<Vec<User>, StoreError> {
        Ok(self.db.shelter_members(id)?)
    }

    async fn possible_shelters(&self, user: UserId) -> Result<Vec<Shelter>, StoreError> {
        Ok(self.db.possible_shelters(user)?)
    }

    async fn add_possible_shelter(
        &self,
        user: UserId,
        shelter: ChatId,
    ) -> Result<bool, StoreError> {
        Ok(self.db.add_possible_shelter(user, shelter)?)
    }

    async fn donate_coins(
        &self,
        user: UserId,
        shelter: ChatId,
        amount: i64,
    ) -> Result<DonationOutcome, StoreError> {
        Ok(self.db.donate_coins(user, shelter, amount)?)
    }

    async fn donate_supplies(
        &self,
        user: UserId,
        shelter: ChatId,
        item: &str,
        quantity: i64,
    ) -> Result<DonationOutcome, StoreError> {
        Ok(self.db.donate_supplies(user, shelter, item, quantity)?)
    }

    async fn shop_items(&self) -> Result<Vec<ShopItem>, StoreError> {
        Ok(self.db.shop_items()?)
    }

    async fn purchase(&self, user: UserId, item_id: i64) -> Result<PurchaseOutcome, StoreError> {
        Ok(self.db.purchase(user, item_id)?)
    }

    async fn record_survival_score(
        &self,
        user: UserId,
        scenario_average: f64,
    ) -> Result<Option<f64>, StoreError> {
        Ok(self.db.record_survival_score(user, scenario_average)?)
    }
}

#[async_trait]
impl QuestionHistory for DatabaseStore {
    async fn purge_older_than(
        &self,
        user: UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Ok(self.db.purge_history_before(user, cutoff)?)
    }

    async fn recent(&self, user: UserId, limit: usize) -> Result<Vec<String>, StoreError> {
        Ok(self.db.recent_questions(user, limit)?)
    }

    async fn record(&self, user: UserId, question: &str) -> Result<(), StoreError> {
        Ok(self.db.record_question(user, question)?)
    }

    async fn trim_to(&self, user: UserId, keep: usize) -> Result<usize, StoreError> {
        Ok(self.db.trim_history(user, keep)?)
    }

    async fn clear_all(&self) -> Result<usize, StoreError> {
        Ok(self.db.clear_history()?)
    }
}
