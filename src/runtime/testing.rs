//! Mock implementations for testing
//!
//! These mocks let the dispatcher and stores run without a chat platform,
//! a generation service or a database file.

use super::traits::*;
use crate::chat::{Acknowledgement, Actor, ChatId, MemberStatus, MessageId, SendOptions, UserId};
use crate::content::{ContentError, Evaluation};
use crate::db::{
    Database, DonationOutcome, NewShelter, PurchaseOutcome, Shelter, ShopItem, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Recording Transport
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub opts: SendOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditedMessage {
    pub chat: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub opts: SendOptions,
}

/// Transport that records every call and hands out increasing message ids
pub struct RecordingTransport {
    next_id: AtomicI64,
    sent: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<EditedMessage>>,
    deleted: Mutex<Vec<(ChatId, MessageId)>>,
    acks: Mutex<Vec<(String, Acknowledgement)>>,
    send_error: Mutex<Option<TransportError>>,
    edit_error: Mutex<Option<TransportError>>,
    delete_error: Mutex<Option<TransportError>>,
    statuses: Mutex<HashMap<(ChatId, UserId), MemberStatus>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
            send_error: Mutex::new(None),
            edit_error: Mutex::new(None),
            delete_error: Mutex::new(None),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_sent(&self) -> Option<SentMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn sent_to(&self, chat: ChatId) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat == chat)
            .collect()
    }

    pub fn edits(&self) -> Vec<EditedMessage> {
        self.edits.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(ChatId, MessageId)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn acks(&self) -> Vec<(String, Acknowledgement)> {
        self.acks.lock().unwrap().clone()
    }

    pub fn acks_for(&self, interaction_id: &str) -> Vec<Acknowledgement> {
        self.acks()
            .into_iter()
            .filter(|(id, _)| id == interaction_id)
            .map(|(_, ack)| ack)
            .collect()
    }

    pub fn fail_sends_with(&self, error: TransportError) {
        *self.send_error.lock().unwrap() = Some(error);
    }

    pub fn fail_edits_with(&self, error: TransportError) {
        *self.edit_error.lock().unwrap() = Some(error);
    }

    pub fn fail_deletes_with(&self, error: TransportError) {
        *self.delete_error.lock().unwrap() = Some(error);
    }

    pub fn set_member_status(&self, chat: ChatId, user: UserId, status: MemberStatus) {
        self.statuses.lock().unwrap().insert((chat, user), status);
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageId, TransportError> {
        if let Some(e) = self.send_error.lock().unwrap().clone() {
            return Err(e);
        }
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentMessage {
            chat,
            message_id,
            text: text.to_string(),
            opts,
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        opts: SendOptions,
    ) -> Result<(), TransportError> {
        if let Some(e) = self.edit_error.lock().unwrap().clone() {
            return Err(e);
        }
        self.edits.lock().unwrap().push(EditedMessage {
            chat,
            message_id,
            text: text.to_string(),
            opts,
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        if let Some(e) = self.delete_error.lock().unwrap().clone() {
            return Err(e);
        }
        self.deleted.lock().unwrap().push((chat, message_id));
        Ok(())
    }

    async fn answer_interaction(
        &self,
        interaction_id: &str,
        ack: Acknowledgement,
    ) -> Result<(), TransportError> {
        self.acks
            .lock()
            .unwrap()
            .push((interaction_id.to_string(), ack));
        Ok(())
    }

    async fn member_status(
        &self,
        chat: ChatId,
        user: UserId,
    ) -> Result<MemberStatus, TransportError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&(chat, user))
            .copied()
            .unwrap_or(MemberStatus::Member))
    }

    fn bot_username(&self) -> &str {
        "shelter_bot"
    }
}

// ============================================================================
// In-memory Game Store
// ============================================================================

/// Game store over an in-memory SQLite database, with fault and latency
/// injection for the dispatcher tests
pub struct InMemoryGameStore {
    db: Database,
    join_delay: Mutex<Option<Duration>>,
    fail_writes: Mutex<bool>,
    shelter_writes: AtomicUsize,
}

impl InMemoryGameStore {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        db.seed_shop_items().unwrap();
        Self {
            db,
            join_delay: Mutex::new(None),
            fail_writes: Mutex::new(false),
            shelter_writes: AtomicUsize::new(0),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Register a player directly
    pub fn with_user(self, actor: &Actor) -> Self {
        self.db.upsert_user(actor).unwrap();
        self
    }

    pub fn with_shelter(self, id: ChatId, name: &str) -> Self {
        self.db
            .upsert_shelter(&NewShelter {
                id,
                name: name.to_string(),
                province: "Tehran Province".to_string(),
                city: "Tehran".to_string(),
            })
            .unwrap();
        self
    }

    /// Slow down `set_user_shelter` so concurrent handlers overlap
    pub fn delay_joins(&self, delay: Duration) {
        *self.join_delay.lock().unwrap() = Some(delay);
    }

    /// Make every write fail with a storage error
    pub fn fail_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }

    /// Number of `set_user_shelter` calls that reached the database
    pub fn shelter_writes(&self) -> usize {
        self.shelter_writes.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if *self.fail_writes.lock().unwrap() {
            Err(StoreError("disk full".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryGameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameStore for InMemoryGameStore {
    async fn user_exists(&self, id: UserId) -> Result<bool, StoreError> {
        Ok(self.db.user_exists(id)?)
    }

    async fn upsert_user(&self, actor: &Actor) -> Result<(), StoreError> {
        self.check_write()?;
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
        let delay = *self.join_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_write()?;
        self.shelter_writes.fetch_add(1, Ordering::SeqCst);
        Ok(self.db.set_user_shelter(id, shelter)?)
    }

    async fn get_shelter(&self, id: ChatId) -> Result<Option<Shelter>, StoreError> {
        Ok(self.db.get_shelter(id)?)
    }

    async fn upsert_shelter(&self, shelter: &NewShelter) -> Result<(), StoreError> {
        self.check_write()?;
        Ok(self.db.upsert_shelter(shelter)?)
    }

    async fn delete_shelter(&self, id: ChatId) -> Result<usize, StoreError> {
        self.check_write()?;
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
        self.check_write()?;
        Ok(self.db.add_possible_shelter(user, shelter)?)
    }

    async fn donate_coins(
        &self,
        user: UserId,
        shelter: ChatId,
        amount: i64,
    ) -> Result<DonationOutcome, StoreError> {
        self.check_write()?;
        Ok(self.db.donate_coins(user, shelter, amount)?)
    }

    async fn donate_supplies(
        &self,
        user: UserId,
        shelter: ChatId,
        item: &str,
        quantity: i64,
    ) -> Result<DonationOutcome, StoreError> {
        self.check_write()?;
        Ok(self.db.donate_supplies(user, shelter, item, quantity)?)
    }

    async fn shop_items(&self) -> Result<Vec<ShopItem>, StoreError> {
        Ok(self.db.shop_items()?)
    }

    async fn purchase(&self, user: UserId, item_id: i64) -> Result<PurchaseOutcome, StoreError> {
        self.check_write()?;
        Ok(self.db.purchase(user, item_id)?)
    }

    async fn record_survival_score(
        &self,
        user: UserId,
        scenario_average: f64,
    ) -> Result<Option<f64>, StoreError> {
        self.check_write()?;
        Ok(self.db.record_survival_score(user, scenario_average)?)
    }
}

#[async_trait]
impl QuestionHistory for InMemoryGameStore {
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

// ============================================================================
// Scripted Content Generator
// ============================================================================

/// Content generator that returns queued results
pub struct MockContent {
    available: bool,
    scenarios: Mutex<VecDeque<Result<Option<String>, ContentError>>>,
    evaluations: Mutex<VecDeque<Result<Option<Evaluation>, ContentError>>>,
    /// Record of (scenario, answer) pairs sent for evaluation
    pub evaluated: Mutex<Vec<(String, String)>>,
}

impl MockContent {
    pub fn new() -> Self {
        Self {
            available: true,
            scenarios: Mutex::new(VecDeque::new()),
            evaluations: Mutex::new(VecDeque::new()),
            evaluated: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn queue_scenario(&self, scenario: Option<&str>) {
        self.scenarios
            .lock()
            .unwrap()
            .push_back(Ok(scenario.map(str::to_string)));
    }

    pub fn queue_evaluation(&self, evaluation: Option<Evaluation>) {
        self.evaluations.lock().unwrap().push_back(Ok(evaluation));
    }

    pub fn queue_evaluation_error(&self, error: ContentError) {
        self.evaluations.lock().unwrap().push_back(Err(error));
    }
}

impl Default for MockContent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentGenerator for MockContent {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn generate(&self, _actor: &Actor) -> Result<Option<String>, ContentError> {
        self.scenarios
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }

    async fn evaluate(
        &self,
        scenario: &str,
        answer: &str,
    ) -> Result<Option<Evaluation>, ContentError> {
        self.evaluated
            .lock()
            .unwrap()
            .push((scenario.to_string(), answer.to_string()));
        self.evaluations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }
}
