//! Reply correlation: prompt message -> the flow waiting for its reply
//!
//! A reply is only accepted when it answers the exact prompt currently
//! pending. Anything else is `NotThisFlow` so other consumers get a turn.
//! A match claims the prompt, so a duplicate delivery of the same reply
//! finds nothing pending.

use crate::chat::{ChatId, MessageId, UserId};
use crate::state_machine::{Session, SessionUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("A wizard is already open in this conversation")]
    AlreadyOpen,
}

/// Outcome of offering a reply to a correlation store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation<T> {
    Matched(T),
    NotThisFlow,
}

#[cfg(test)]
impl<T> Correlation<T> {
    pub fn matched(self) -> Option<T> {
        match self {
            Correlation::Matched(value) => Some(value),
            Correlation::NotThisFlow => None,
        }
    }
}

/// Wizard sessions, one per conversation
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Reserve the conversation for a new wizard started by `initiator`
    async fn open(&self, conversation: ChatId, initiator: UserId)
        -> Result<(), CorrelationError>;

    /// Rotate the pending prompt and merge `update`. Returns false when no
    /// session is open.
    async fn advance(
        &self,
        conversation: ChatId,
        prompt_id: MessageId,
        update: SessionUpdate,
    ) -> bool;

    /// Match an answer against the pending prompt and the initiator. A match
    /// claims the prompt: until [`advance`](Self::advance) or
    /// [`release`](Self::release) runs, nothing else matches it.
    async fn resolve(
        &self,
        conversation: ChatId,
        reply_to: MessageId,
        actor: UserId,
    ) -> Correlation<Session>;

    /// Hand a claimed prompt back when the answer produced no new prompt.
    /// No-op once the session has moved on or closed.
    async fn release(&self, conversation: ChatId, prompt_id: MessageId);

    /// Current session, if any (used for button picks which carry no reply-to)
    async fn get(&self, conversation: ChatId) -> Option<Session>;

    /// Remove the session; idempotent
    async fn close(&self, conversation: ChatId);
}

/// Process-wide in-memory session map
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<ChatId, Session>>,
    ttl: Option<Duration>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions older than `ttl` are treated as abandoned
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn with_sessions<R>(&self, f: impl FnOnce(&mut HashMap<ChatId, Session>) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut sessions)
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn open(
        &self,
        conversation: ChatId,
        initiator: UserId,
    ) -> Result<(), CorrelationError> {
        let ttl = self.ttl;
        self.with_sessions(|sessions| {
            if let Some(existing) = sessions.get(&conversation) {
                if !existing.is_expired(ttl) {
                    return Err(CorrelationError::AlreadyOpen);
                }
                tracing::info!(
                    chat_id = conversation,
                    initiator = existing.initiator,
                    "Replacing expired wizard session"
                );
            }
            sessions.insert(conversation, Session::new(conversation, initiator));
            Ok(())
        })
    }

    async fn advance(
        &self,
        conversation: ChatId,
        prompt_id: MessageId,
        update: SessionUpdate,
    ) -> bool {
        self.with_sessions(|sessions| match sessions.get_mut(&conversation) {
            Some(session) => {
                session.apply(prompt_id, update);
                true
            }
            None => false,
        })
    }

    async fn resolve(
        &self,
        conversation: ChatId,
        reply_to: MessageId,
        actor: UserId,
    ) -> Correlation<Session> {
        let ttl = self.ttl;
        self.with_sessions(|sessions| {
            let Some(session) = sessions.get_mut(&conversation) else {
                return Correlation::NotThisFlow;
            };
            if session.is_expired(ttl) {
                tracing::info!(chat_id = conversation, "Dropping expired wizard session");
                sessions.remove(&conversation);
                return Correlation::NotThisFlow;
            }
            if session.pending_prompt_id != Some(reply_to) || session.initiator != actor {
                return Correlation::NotThisFlow;
            }
            let claimed = session.clone();
            session.pending_prompt_id = None;
            Correlation::Matched(claimed)
        })
    }

    async fn release(&self, conversation: ChatId, prompt_id: MessageId) {
        self.with_sessions(|sessions| {
            if let Some(session) = sessions.get_mut(&conversation) {
                if session.pending_prompt_id.is_none() {
                    session.pending_prompt_id = Some(prompt_id);
                }
            }
        });
    }

    async fn get(&self, conversation: ChatId) -> Option<Session> {
        let ttl = self.ttl;
        self.with_sessions(|sessions| {
            sessions
                .get(&conversation)
                .filter(|s| !s.is_expired(ttl))
                .cloned()
        })
    }

    async fn close(&self, conversation: ChatId) {
        self.with_sessions(|sessions| {
            sessions.remove(&conversation);
        });
    }
}

// ============================================================================
// Donation prompts
// ============================================================================

/// What a donation prompt collects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonationKind {
    /// Coins into the shelter treasury
    Coins,
    /// Backpack items into the shelter stockpile
    Supplies,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationPrompt {
    pub prompt_id: MessageId,
    pub kind: DonationKind,
    pub issued_at: Instant,
}

/// Donation prompts, keyed by (conversation, actor)
#[async_trait]
pub trait DonationPromptRepository: Send + Sync {
    /// Record a prompt, replacing any earlier one for the same key
    async fn issue(
        &self,
        conversation: ChatId,
        actor: UserId,
        prompt_id: MessageId,
        kind: DonationKind,
    );

    /// Remove and return the actor's prompt if `reply_to` answers it. Each
    /// prompt is taken at most once.
    async fn take(
        &self,
        conversation: ChatId,
        actor: UserId,
        reply_to: MessageId,
    ) -> Correlation<DonationPrompt>;

    /// Drop every prompt in a conversation
    async fn close_conversation(&self, conversation: ChatId);
}

#[derive(Debug, Default)]
pub struct InMemoryDonationPrompts {
    prompts: Mutex<HashMap<(ChatId, UserId), DonationPrompt>>,
}

impl InMemoryDonationPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_prompts<R>(
        &self,
        f: impl FnOnce(&mut HashMap<(ChatId, UserId), DonationPrompt>) -> R,
    ) -> R {
        let mut prompts = self.prompts.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut prompts)
    }
}

#[async_trait]
impl DonationPromptRepository for InMemoryDonationPrompts {
    async fn issue(
        &self,
        conversation: ChatId,
        actor: UserId,
        prompt_id: MessageId,
        kind: DonationKind,
    ) {
        self.with_prompts(|prompts| {
            prompts.insert(
                (conversation, actor),
                DonationPrompt {
                    prompt_id,
                    kind,
                    issued_at: Instant::now(),
                },
            );
        });
    }

    async fn take(
        &self,
        conversation: ChatId,
        actor: UserId,
        reply_to: MessageId,
    ) -> Correlation<DonationPrompt> {
        self.with_prompts(|prompts| {
            let key = (conversation, actor);
            match prompts.get(&key) {
                Some(prompt) if prompt.prompt_id == reply_to => {
                    prompts.remove(&key).map_or(Correlation::NotThisFlow, Correlation::Matched)
                }
                _ => Correlation::NotThisFlow,
            }
        })
    }

    async fn close_conversation(&self, conversation: ChatId) {
        self.with_prompts(|prompts| prompts.retain(|(chat, _), _| *chat != conversation));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::state::WizardStep;

    #[tokio::test]
    async fn test_second_open_is_rejected_and_first_untouched() {
        let repo = InMemorySessionRepository::new();
        repo.open(-1, 10).await.unwrap();
        assert!(repo.advance(-1, 100, SessionUpdate::default()).await);

        assert_eq!(repo.open(-1, 11).await, Err(CorrelationError::AlreadyOpen));

        let session = repo.get(-1).await.unwrap();
        assert_eq!(session.initiator, 10);
        assert_eq!(session.pending_prompt_id, Some(100));
    }

    #[tokio::test]
    async fn test_resolve_requires_pending_prompt_and_initiator() {
        let repo = InMemorySessionRepository::new();
        repo.open(-1, 10).await.unwrap();

        // No prompt sent yet
        assert_eq!(repo.resolve(-1, 100, 10).await, Correlation::NotThisFlow);

        repo.advance(-1, 100, SessionUpdate::default()).await;
        assert_eq!(repo.resolve(-1, 99, 10).await, Correlation::NotThisFlow);
        assert_eq!(repo.resolve(-1, 100, 11).await, Correlation::NotThisFlow);
        assert_eq!(repo.resolve(-2, 100, 10).await, Correlation::NotThisFlow);
        assert!(repo.resolve(-1, 100, 10).await.matched().is_some());
    }

    #[tokio::test]
    async fn test_match_claims_prompt_until_released() {
        let repo = InMemorySessionRepository::new();
        repo.open(-1, 10).await.unwrap();
        repo.advance(-1, 100, SessionUpdate::default()).await;

        let claimed = repo.resolve(-1, 100, 10).await.matched().unwrap();
        assert_eq!(claimed.pending_prompt_id, Some(100));
        // A second delivery of the same reply finds nothing pending
        assert_eq!(repo.resolve(-1, 100, 10).await, Correlation::NotThisFlow);
        assert_eq!(repo.get(-1).await.unwrap().pending_prompt_id, None);

        repo.release(-1, 100).await;
        assert!(repo.resolve(-1, 100, 10).await.matched().is_some());
    }

    #[tokio::test]
    async fn test_release_after_advance_keeps_new_prompt() {
        let repo = InMemorySessionRepository::new();
        repo.open(-1, 10).await.unwrap();
        repo.advance(-1, 100, SessionUpdate::default()).await;
        repo.resolve(-1, 100, 10).await.matched().unwrap();
        repo.advance(-1, 101, SessionUpdate::default()).await;

        repo.release(-1, 100).await;
        assert_eq!(repo.get(-1).await.unwrap().pending_prompt_id, Some(101));

        repo.close(-1).await;
        repo.release(-1, 101).await;
        assert!(repo.get(-1).await.is_none());
    }

    #[tokio::test]
    async fn test_advance_rotates_correlation_key() {
        let repo = InMemorySessionRepository::new();
        repo.open(-1, 10).await.unwrap();
        repo.advance(-1, 100, SessionUpdate::default()).await;
        assert!(repo.resolve(-1, 100, 10).await.matched().is_some());
        repo.advance(
            -1,
            101,
            SessionUpdate {
                step: Some(WizardStep::AwaitingRegion),
                name: Some("Bunker".to_string()),
                ..SessionUpdate::default()
            },
        )
        .await;

        assert_eq!(repo.resolve(-1, 100, 10).await, Correlation::NotThisFlow);
        let session = repo.resolve(-1, 101, 10).await.matched().unwrap();
        assert_eq!(session.step, WizardStep::AwaitingRegion);
        assert_eq!(session.fields.name.as_deref(), Some("Bunker"));
    }

    #[tokio::test]
    async fn test_advance_without_session_is_noop() {
        let repo = InMemorySessionRepository::new();
        assert!(!repo.advance(-1, 100, SessionUpdate::default()).await);
        assert!(repo.get(-1).await.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let repo = InMemorySessionRepository::new();
        repo.close(-1).await;
        repo.open(-1, 10).await.unwrap();
        repo.close(-1).await;
        repo.close(-1).await;
        assert!(repo.get(-1).await.is_none());
        repo.open(-1, 11).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_session_is_replaced_and_not_resolved() {
        let repo = InMemorySessionRepository::with_ttl(Some(Duration::from_millis(1)));
        repo.open(-1, 10).await.unwrap();
        repo.advance(-1, 100, SessionUpdate::default()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(repo.resolve(-1, 100, 10).await, Correlation::NotThisFlow);
        assert!(repo.get(-1).await.is_none());

        repo.open(-1, 10).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        // A stale reservation does not block a new wizard
        repo.open(-1, 11).await.unwrap();
    }

    #[tokio::test]
    async fn test_donation_prompts_are_keyed_per_actor() {
        let prompts = InMemoryDonationPrompts::new();
        prompts.issue(-1, 10, 500, DonationKind::Coins).await;
        prompts.issue(-1, 11, 501, DonationKind::Supplies).await;

        assert_eq!(prompts.take(-1, 10, 501).await, Correlation::NotThisFlow);
        let prompt = prompts.take(-1, 11, 501).await.matched().unwrap();
        assert_eq!(prompt.kind, DonationKind::Supplies);

        // Taken once; the other actor's prompt is untouched
        assert_eq!(prompts.take(-1, 11, 501).await, Correlation::NotThisFlow);
        assert!(prompts.take(-1, 10, 500).await.matched().is_some());

        prompts.issue(-1, 10, 503, DonationKind::Coins).await;
        prompts.close_conversation(-1).await;
        assert_eq!(prompts.take(-1, 10, 503).await, Correlation::NotThisFlow);
    }

    #[tokio::test]
    async fn test_concurrent_takes_of_one_prompt_match_once() {
        let prompts = InMemoryDonationPrompts::new();
        prompts.issue(-1, 10, 500, DonationKind::Coins).await;

        let (a, b) = tokio::join!(prompts.take(-1, 10, 500), prompts.take(-1, 10, 500));
        let matched = [a, b]
            .into_iter()
            .filter(|c| matches!(c, Correlation::Matched(_)))
            .count();
        assert_eq!(matched, 1);
    }

    #[tokio::test]
    async fn test_reissued_donation_prompt_supersedes_old_one() {
        let prompts = InMemoryDonationPrompts::new();
        prompts.issue(-1, 10, 500, DonationKind::Coins).await;
        prompts.issue(-1, 10, 502, DonationKind::Coins).await;
        assert_eq!(prompts.take(-1, 10, 500).await, Correlation::NotThisFlow);
        assert!(prompts.take(-1, 10, 502).await.matched().is_some());
    }
}
