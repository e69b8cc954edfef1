//! Wizard engine: runs the shelter registration state machine
//!
//! Owns the I/O half of the wizard. Each accepted input goes through the
//! pure [`transition`] and the resulting effects are executed in order.
//! Every path that ends the flow (completion, storage failure, transport
//! failure) closes the session.

use crate::chat::{
    Acknowledgement, ButtonPress, ChatId, MessageId, SendOptions, TextMessage, UserId,
};
use crate::db::NewShelter;
use crate::reference::RegionLookup;
use crate::runtime::{ChatTransport, GameStore, StoreError, TransportError};
use crate::state_machine::{
    opening_prompt, transition, Effect, Event, Session, ShelterDraft, TransitionError, WizardField,
};
use crate::stores::{delete_quietly, Correlation, CorrelationError, SessionRepository};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WizardError {
    #[error(transparent)]
    AlreadyOpen(#[from] CorrelationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Could not send prompt: {0}")]
    Transport(#[from] TransportError),
}

pub struct WizardEngine {
    sessions: Arc<dyn SessionRepository>,
    lookup: Arc<dyn RegionLookup>,
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn GameStore>,
}

impl WizardEngine {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        lookup: Arc<dyn RegionLookup>,
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn GameStore>,
    ) -> Self {
        Self {
            sessions,
            lookup,
            transport,
            store,
        }
    }

    /// Open a session and send the first prompt. Privilege checks are the
    /// caller's job.
    pub async fn start(
        &self,
        conversation: ChatId,
        initiator: UserId,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, WizardError> {
        self.sessions.open(conversation, initiator).await?;
        let mut effect = opening_prompt();
        if let Some(reply_to) = reply_to {
            effect = effect.replying_to(reply_to);
        }
        let prompt_id = self
            .execute(conversation, vec![effect])
            .await?
            .unwrap_or_default();
        tracing::info!(chat_id = conversation, initiator, prompt_id, "Shelter wizard started");
        Ok(prompt_id)
    }

    /// Offer a text message to the wizard. Returns false when it does not
    /// answer the pending prompt, so other consumers can take it.
    pub async fn handle_reply(&self, message: &TextMessage) -> bool {
        let Some(reply_to) = message.reply_to else {
            return false;
        };
        let conversation = message.conversation.id;
        let session = match self
            .sessions
            .resolve(conversation, reply_to, message.actor.id)
            .await
        {
            Correlation::Matched(session) => session,
            Correlation::NotThisFlow => return false,
        };

        let event = Event::TextReply {
            text: message.text.clone(),
            message_id: message.message_id,
        };
        if let Err(e) = self.advance(&session, event).await {
            tracing::warn!(chat_id = conversation, error = %e, "Wizard reply failed");
        }
        self.sessions.release(conversation, reply_to).await;
        true
    }

    /// Handle a suggestion button press. The returned acknowledgement is
    /// sent by the dispatcher.
    pub async fn handle_pick(
        &self,
        press: &ButtonPress,
        field: WizardField,
        candidate_id: i64,
    ) -> Acknowledgement {
        let conversation = press.conversation.id;
        let Some(session) = self.sessions.get(conversation).await else {
            return Acknowledgement::alert(
                "This registration is no longer open. Start again with /shelter.",
            );
        };
        if session.initiator != press.actor.id {
            return Acknowledgement::alert("Only the person registering the shelter can choose.");
        }
        let session = match self
            .sessions
            .resolve(conversation, press.message_id, press.actor.id)
            .await
        {
            Correlation::Matched(session) => session,
            Correlation::NotThisFlow => {
                return Acknowledgement::alert("These suggestions are out of date.");
            }
        };

        let event = Event::CandidatePicked {
            field,
            candidate_id,
            message_id: press.message_id,
        };
        let outcome = self.advance(&session, event).await;
        self.sessions.release(conversation, press.message_id).await;
        match outcome {
            Ok(()) => Acknowledgement::silent(),
            Err(WizardError::Transition(e)) => {
                tracing::debug!(chat_id = conversation, error = %e, "Rejected candidate pick");
                Acknowledgement::alert("That choice is not allowed at this step.")
            }
            Err(e) => {
                tracing::warn!(chat_id = conversation, error = %e, "Candidate pick failed");
                Acknowledgement::alert("Something went wrong. Start again with /shelter.")
            }
        }
    }

    /// Drop any session for the conversation
    pub async fn abandon(&self, conversation: ChatId) {
        self.sessions.close(conversation).await;
    }

    pub async fn is_open(&self, conversation: ChatId) -> bool {
        self.sessions.get(conversation).await.is_some()
    }

    async fn advance(&self, session: &Session, event: Event) -> Result<(), WizardError> {
        let result = transition(session, self.lookup.as_ref(), event)?;
        tracing::debug!(
            chat_id = session.conversation_id,
            from = ?session.step,
            to = ?result.new_step,
            effects = result.effects.len(),
            "Wizard transition"
        );
        self.execute(session.conversation_id, result.effects).await?;
        Ok(())
    }

    /// Run effects in order. Returns the id of the last prompt sent.
    async fn execute(
        &self,
        conversation: ChatId,
        effects: Vec<Effect>,
    ) -> Result<Option<MessageId>, WizardError> {
        let mut last_prompt = None;
        for effect in effects {
            match effect {
                Effect::DeleteMessage { message_id } => {
                    delete_quietly(self.transport.as_ref(), conversation, message_id).await;
                }
                Effect::SendPrompt {
                    text,
                    keyboard,
                    reply_to,
                    update,
                } => {
                    let mut opts = SendOptions::default();
                    if let Some(reply_to) = reply_to {
                        opts = opts.reply_to(reply_to);
                    }
                    opts = match keyboard {
                        Some(keyboard) => opts.keyboard(keyboard),
                        None => opts.force_reply(),
                    };
                    match self.transport.send_message(conversation, &text, opts).await {
                        Ok(prompt_id) => {
                            self.sessions.advance(conversation, prompt_id, update).await;
                            last_prompt = Some(prompt_id);
                        }
                        Err(e) => {
                            // Nobody can reply to a prompt that was never sent
                            self.sessions.close(conversation).await;
                            return Err(e.into());
                        }
                    }
                }
                Effect::Finalize(draft) => {
                    self.finalize(draft).await;
                }
            }
        }
        Ok(last_prompt)
    }

    /// Persist the shelter and report the outcome. The session is closed
    /// whatever happens.
    async fn finalize(&self, draft: ShelterDraft) {
        let conversation = draft.conversation_id;
        let text = match self.persist(&draft).await {
            Ok(()) => {
                tracing::info!(
                    chat_id = conversation,
                    name = %draft.name,
                    initiator = draft.initiator,
                    "Shelter registered"
                );
                format!(
                    "✅ Shelter \"{}\" is registered in {}, {}.\n\n\
                     Other survivors in this group can join with /shelter.",
                    draft.name, draft.sub_region.name, draft.region.name
                )
            }
            Err(e) => {
                tracing::error!(chat_id = conversation, error = %e, "Failed to save shelter");
                "❌ The shelter could not be saved. Please start again with /shelter.".to_string()
            }
        };
        self.sessions.close(conversation).await;

        if let Err(e) = self
            .transport
            .send_message(conversation, &text, SendOptions::default())
            .await
        {
            tracing::warn!(chat_id = conversation, error = %e, "Could not report wizard result");
        }
    }

    async fn persist(&self, draft: &ShelterDraft) -> Result<(), StoreError> {
        self.store
            .upsert_shelter(&NewShelter {
                id: draft.conversation_id,
                name: draft.name.clone(),
                province: draft.region.name.clone(),
                city: draft.sub_region.name.clone(),
            })
            .await?;
        self.store
            .set_user_shelter(draft.initiator, Some(draft.conversation_id))
            .await?;
        self.store
            .add_possible_shelter(draft.initiator, draft.conversation_id)
            .await?;
        Ok(())
    }
}
