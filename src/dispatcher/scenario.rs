//! Survival scenarios: generation from the main menu and free-text answers

use super::menus::back_to_main;
use super::{Dispatcher, HandlerResult};
use crate::chat::{Acknowledgement, ButtonPress, ChatId, SendOptions, TextMessage};
use crate::content::Evaluation;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

const TRY_LATER: &str = "The scenario quota for today is used up or the service could not be \
                         reached. Please try again later.";
const ANSWER_HINT: &str = "Write your plan to survive this situation and send it.";

/// Scenarios waiting for an answer, one per conversation
#[derive(Debug, Default)]
pub struct PendingScenarios {
    pending: Mutex<HashMap<ChatId, String>>,
}

impl PendingScenarios {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, conversation: ChatId, scenario: String) {
        self.lock().insert(conversation, scenario);
    }

    pub fn get(&self, conversation: ChatId) -> Option<String> {
        self.lock().get(&conversation).cloned()
    }

    #[cfg(test)]
    pub fn is_pending(&self, conversation: ChatId) -> bool {
        self.lock().contains_key(&conversation)
    }

    /// Remove and return the scenario; only one answer can claim it
    pub fn take(&self, conversation: ChatId) -> Option<String> {
        self.lock().remove(&conversation)
    }

    pub fn discard(&self, conversation: ChatId) {
        self.lock().remove(&conversation);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChatId, String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn render_result(evaluation: &Evaluation, new_survival: f64) -> String {
    let mut text = String::from("*Your plan, analysed:*\n\n");
    for (label, score) in evaluation.scores() {
        text.push_str(&format!("- {label}: {score}%\n"));
    }
    if !evaluation.feedback.is_empty() {
        text.push_str(&format!("\n📝 *Feedback:* {}\n", evaluation.feedback));
    }
    text.push_str(&format!(
        "\n⭐ *Score this round:* {:.2}%\n🧟 *Overall survival chance:* {new_survival:.2}%",
        evaluation.average()
    ));
    text
}

impl Dispatcher {
    /// `action:start_scenario`
    pub(super) async fn start_scenario(
        &self,
        press: &ButtonPress,
    ) -> HandlerResult<Acknowledgement> {
        let conversation = press.conversation.id;

        if let Some(existing) = self.scenarios.get(conversation) {
            self.send(
                conversation,
                "You have an unanswered scenario. Please answer it first.",
                SendOptions::default(),
            )
            .await?;
            self.send(
                conversation,
                &format!("🧟 Scenario reminder:\n\n{existing}\n\n{ANSWER_HINT}"),
                SendOptions::default(),
            )
            .await?;
            return Ok(Acknowledgement::silent());
        }

        if !self.content.is_available() {
            self.edit(
                conversation,
                press.message_id,
                "The scenario service is currently disabled. Please try again later.",
                SendOptions::default().keyboard(back_to_main()),
            )
            .await?;
            return Ok(Acknowledgement::silent());
        }

        self.edit(
            conversation,
            press.message_id,
            "⏳ Building an apocalyptic scenario...",
            SendOptions::default(),
        )
        .await?;

        let scenario = match self.content.generate(&press.actor).await {
            Ok(scenario) => scenario,
            Err(e) => {
                tracing::warn!(user_id = press.actor.id, error = %e, "Scenario generation failed");
                None
            }
        };

        match scenario {
            Some(scenario) => {
                self.scenarios.post(conversation, scenario.clone());
                tracing::info!(chat_id = conversation, user_id = press.actor.id, "Scenario posted");
                self.edit(
                    conversation,
                    press.message_id,
                    &format!("🧟 New scenario:\n\n{scenario}\n\n{ANSWER_HINT}"),
                    SendOptions::default(),
                )
                .await?;
            }
            None => {
                self.edit(
                    conversation,
                    press.message_id,
                    TRY_LATER,
                    SendOptions::default().keyboard(back_to_main()),
                )
                .await?;
            }
        }
        Ok(Acknowledgement::silent())
    }

    /// Treat free text as the answer to a pending scenario. Returns false
    /// when nothing is pending.
    pub(super) async fn answer_scenario(&self, message: &TextMessage) -> HandlerResult<bool> {
        let conversation = message.conversation.id;
        let Some(scenario) = self.scenarios.take(conversation) else {
            return Ok(false);
        };

        self.send(
            conversation,
            "🧠 Analysing and scoring your plan...",
            SendOptions::default(),
        )
        .await?;

        let evaluation = match self.content.evaluate(&scenario, &message.text).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::warn!(chat_id = conversation, error = %e, "Scenario evaluation failed");
                None
            }
        };

        let (text, opts) = match evaluation {
            Some(evaluation) => {
                let average = evaluation.average();
                match self
                    .store
                    .record_survival_score(message.actor.id, average)
                    .await?
                {
                    Some(new_survival) => {
                        tracing::info!(
                            user_id = message.actor.id,
                            average,
                            new_survival,
                            "Scenario scored"
                        );
                        (render_result(&evaluation, new_survival), SendOptions::markdown())
                    }
                    None => (
                        "Error: your player record was not found.".to_string(),
                        SendOptions::default(),
                    ),
                }
            }
            None => (
                "The evaluation quota for today is used up or the service could not be \
                 reached. Please try again later."
                    .to_string(),
                SendOptions::default(),
            ),
        };

        let result_id = self
            .send(conversation, &text, opts.keyboard(back_to_main()))
            .await?;
        // The old menu now holds the scenario text; this message takes over
        self.menus.adopt(conversation, result_id).await;
        Ok(true)
    }
}
