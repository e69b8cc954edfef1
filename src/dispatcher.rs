//! Dispatcher: the single entry point for inbound chat events
//!
//! Button presses go through a fixed pipeline: one acknowledgement, the
//! stale-menu check, the per-actor action lock, then the handler families
//! in precedence order (join, wizard, management, navigation). Text goes to
//! the command table, then the wizard, then donation prompts, then
//! scenario answers. Handler failures are logged and turned into an apology;
//! nothing propagates to the event loop.

pub mod callback;
mod commands;
mod manager;
mod menus;
mod scenario;
mod shelter;
mod shop;

#[cfg(test)]
mod proptests;

use callback::CallbackAction;
use scenario::PendingScenarios;

use crate::chat::{
    Acknowledgement, ButtonPress, ChatId, InboundEvent, MessageId, SendOptions, TextMessage,
    UserId,
};
use crate::content::ContentError;
use crate::reference::RegionLookup;
use crate::runtime::{
    ChatTransport, ContentGenerator, GameStore, QuestionHistory, StoreError, TransportError,
};
use crate::stores::{
    delete_quietly, ActionLock, ActiveMessageTracker, DonationPromptRepository, SessionRepository,
};
use crate::wizard::WizardEngine;
use std::sync::Arc;
use thiserror::Error;

const APOLOGY: &str = "❌ Something went wrong. Please try again.";
const START_PRIVATELY: &str =
    "To use the bot's buttons, first start the bot in a private chat with /start.";

/// Failure inside a single handler
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Content(#[from] ContentError),
}

type HandlerResult<T = ()> = Result<T, DispatchError>;

/// One-shot acknowledgement for an interaction. Answering consumes it, so a
/// press can never be answered twice.
#[derive(Debug)]
#[must_use = "every interaction must be answered exactly once"]
pub struct PendingAck {
    interaction_id: String,
}

impl PendingAck {
    pub fn new(press: &ButtonPress) -> Self {
        Self {
            interaction_id: press.interaction_id.clone(),
        }
    }

    pub async fn answer<T: ChatTransport + ?Sized>(self, transport: &T, ack: Acknowledgement) {
        if let Err(e) = transport.answer_interaction(&self.interaction_id, ack).await {
            tracing::debug!(
                interaction_id = %self.interaction_id,
                error = %e,
                "Could not answer interaction"
            );
        }
    }
}

/// Collaborators the dispatcher is built from
pub struct Dependencies {
    pub transport: Arc<dyn ChatTransport>,
    pub store: Arc<dyn GameStore>,
    pub history: Arc<dyn QuestionHistory>,
    pub content: Arc<dyn ContentGenerator>,
    pub lookup: Arc<dyn RegionLookup>,
    pub sessions: Arc<dyn SessionRepository>,
    pub donations: Arc<dyn DonationPromptRepository>,
    pub menus: ActiveMessageTracker,
    /// Actor allowed into the admin menu
    pub admin: Option<UserId>,
}

pub struct Dispatcher {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn GameStore>,
    history: Arc<dyn QuestionHistory>,
    content: Arc<dyn ContentGenerator>,
    wizard: WizardEngine,
    donations: Arc<dyn DonationPromptRepository>,
    menus: ActiveMessageTracker,
    lock: ActionLock,
    scenarios: PendingScenarios,
    admin: Option<UserId>,
}

impl Dispatcher {
    pub fn new(deps: Dependencies) -> Self {
        let wizard = WizardEngine::new(
            deps.sessions,
            deps.lookup,
            deps.transport.clone(),
            deps.store.clone(),
        );
        Self {
            transport: deps.transport,
            store: deps.store,
            history: deps.history,
            content: deps.content,
            wizard,
            donations: deps.donations,
            menus: deps.menus,
            lock: ActionLock::new(),
            scenarios: PendingScenarios::new(),
            admin: deps.admin,
        }
    }

    /// Handle one inbound event to completion
    pub async fn dispatch(&self, event: InboundEvent) {
        match event {
            InboundEvent::Text(message) => self.on_text(&message).await,
            InboundEvent::Button(press) => self.on_button(&press).await,
            InboundEvent::Membership(change) => self.on_membership(&change).await,
        }
    }

    // ========================================================================
    // Button presses
    // ========================================================================

    async fn on_button(&self, press: &ButtonPress) {
        let pending = PendingAck::new(press);
        let Some(action) = CallbackAction::parse(&press.payload) else {
            tracing::debug!(payload = %press.payload, "Ignoring unknown button payload");
            pending.answer(self.transport.as_ref(), Acknowledgement::silent()).await;
            return;
        };

        match self.store.user_exists(press.actor.id).await {
            Ok(true) => {}
            Ok(false) => {
                pending
                    .answer(self.transport.as_ref(), Acknowledgement::alert(START_PRIVATELY))
                    .await;
                return;
            }
            Err(e) => {
                tracing::error!(user_id = press.actor.id, error = %e, "Registration check failed");
                pending
                    .answer(self.transport.as_ref(), Acknowledgement::alert(APOLOGY))
                    .await;
                return;
            }
        }

        let deferred = if action.requires_alert() {
            Some(pending)
        } else {
            pending.answer(self.transport.as_ref(), Acknowledgement::silent()).await;
            None
        };

        let ack = self.route_button(press, &action, deferred.is_some()).await;

        if let Some(pending) = deferred {
            pending.answer(self.transport.as_ref(), ack).await;
        }
    }

    /// Stale check, action lock, then the handler. Returns the
    /// acknowledgement for actions that answer late.
    async fn route_button(
        &self,
        press: &ButtonPress,
        action: &CallbackAction,
        deferred: bool,
    ) -> Acknowledgement {
        let conversation = press.conversation.id;

        if self.menus.is_stale(conversation, press.message_id).await {
            tracing::debug!(
                chat_id = conversation,
                message_id = press.message_id,
                "Press on a superseded menu"
            );
            delete_quietly(self.transport.as_ref(), conversation, press.message_id).await;
            return Acknowledgement::silent();
        }

        let _guard = match self.lock.try_enter(press.actor.id) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::debug!(error = %e, payload = %press.payload, "Dropping overlapping press");
                return Acknowledgement::silent();
            }
        };

        tracing::debug!(
            chat_id = conversation,
            user_id = press.actor.id,
            route = ?action.route(),
            payload = %press.payload,
            "Routing button press"
        );

        let result = match action {
            // Join-style direct actions
            CallbackAction::GroupJoin(shelter) => self.join_from_group(press, *shelter).await,
            CallbackAction::PrivateJoin(shelter) => self.join_from_list(press, *shelter).await,
            CallbackAction::LeaveConfirm => self.confirm_leave(press).await,
            CallbackAction::LeaveDo => self.leave_shelter(press).await,

            // Wizard steps
            CallbackAction::Pick {
                field,
                candidate_id,
            } => Ok(self.wizard.handle_pick(press, *field, *candidate_id).await),

            // Shelter management
            CallbackAction::Manage(route) => self.manage(press, *route).await,

            // Navigation and menu actions
            CallbackAction::Navigate { menu, parent } => self.navigate(press, *menu, *parent).await,
            CallbackAction::StartScenario => self.start_scenario(press).await,
            CallbackAction::ManageShelter => self.shelter_overview(press).await,
            CallbackAction::ShowScore => self.show_score(press).await,
            CallbackAction::OpenShop => self.open_shop(press).await,
            CallbackAction::OpenBackpack => self.open_backpack(press).await,
            CallbackAction::Buy(item) => self.buy(press, *item).await,
            CallbackAction::ClearHistory => self.confirm_clear_history(press, None).await,
            CallbackAction::ConfirmClearHistory => self.clear_history(press).await,
        };

        match result {
            Ok(ack) => ack,
            Err(e) => self.report_failure(conversation, &e, deferred).await,
        }
    }

    // ========================================================================
    // Text messages
    // ========================================================================

    async fn on_text(&self, message: &TextMessage) {
        let conversation = message.conversation.id;

        if message.text.starts_with('/') {
            if let Err(e) = self.on_command(message).await {
                self.report_failure(conversation, &e, false).await;
            }
            return;
        }

        if self.wizard.handle_reply(message).await {
            return;
        }

        match self.handle_donation_reply(message).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                self.report_failure(conversation, &e, false).await;
                return;
            }
        }

        match self.answer_scenario(message).await {
            Ok(handled) => {
                if !handled {
                    tracing::trace!(chat_id = conversation, "Text not addressed to the bot");
                }
            }
            Err(e) => {
                tracing::warn!(chat_id = conversation, error = %e, "Scenario answer failed");
                self.report_failure(conversation, &e, false).await;
            }
        }
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    /// Log a handler failure and tell the user. Transient transport outcomes
    /// are swallowed. Deferred acknowledgements carry the apology instead of
    /// a message.
    async fn report_failure(
        &self,
        conversation: ChatId,
        error: &DispatchError,
        deferred: bool,
    ) -> Acknowledgement {
        if let DispatchError::Transport(e) = error {
            if e.is_transient() {
                tracing::debug!(
                    chat_id = conversation,
                    error = %e,
                    "Ignoring transient transport outcome"
                );
                return Acknowledgement::silent();
            }
        }
        tracing::error!(chat_id = conversation, error = %error, "Handler failed");
        if deferred {
            return Acknowledgement::alert(APOLOGY);
        }
        if let Err(e) = self
            .transport
            .send_message(conversation, APOLOGY, SendOptions::default())
            .await
        {
            tracing::warn!(chat_id = conversation, error = %e, "Could not send apology");
        }
        Acknowledgement::silent()
    }

    /// Edit a message; unchanged or vanished targets are not errors
    async fn edit(
        &self,
        conversation: ChatId,
        message_id: MessageId,
        text: &str,
        opts: SendOptions,
    ) -> HandlerResult {
        match self
            .transport
            .edit_message(conversation, message_id, text, opts)
            .await
        {
            Err(e) if e.is_transient() => {
                tracing::debug!(chat_id = conversation, message_id, error = %e, "Edit skipped");
                Ok(())
            }
            other => Ok(other?),
        }
    }

    async fn send(
        &self,
        conversation: ChatId,
        text: &str,
        opts: SendOptions,
    ) -> HandlerResult<MessageId> {
        Ok(self.transport.send_message(conversation, text, opts).await?)
    }

    fn is_admin(&self, user: UserId) -> bool {
        self.admin == Some(user)
    }
}
