//! Survival scenario generation and grading
//!
//! Wraps a text model behind an ordered key ring. A credential that runs out
//! of quota is retired and the request moves on to the next one; when none
//! are left the generator reports "nothing available" instead of an error.

mod error;
mod gemini;
mod key_ring;
mod prompts;

pub use error::ContentError;
pub use gemini::{GeminiBackend, TextBackend};
pub use key_ring::KeyRing;

use crate::chat::Actor;
use crate::runtime::{ContentGenerator, QuestionHistory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// How long generated scenarios are remembered for de-duplication
const HISTORY_WINDOW: chrono::Duration = chrono::Duration::hours(24);

/// Grader scores, each 0 to 100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub practicality: f64,
    pub creativity: f64,
    pub efficiency: f64,
    pub speed: f64,
    pub risk_assessment: f64,
    #[serde(default)]
    pub feedback: String,
}

impl Evaluation {
    pub fn scores(&self) -> [(&'static str, f64); 5] {
        [
            ("Practicality", self.practicality),
            ("Creativity", self.creativity),
            ("Efficiency", self.efficiency),
            ("Speed", self.speed),
            ("Risk assessment", self.risk_assessment),
        ]
    }

    pub fn average(&self) -> f64 {
        self.scores().iter().map(|(_, s)| s.clamp(0.0, 100.0)).sum::<f64>() / 5.0
    }
}

/// Parse grader output, tolerating markdown code fences around the JSON
pub fn parse_evaluation(raw: &str) -> Option<Evaluation> {
    let cleaned = raw.trim().replace("```json", "").replace("```", "");
    match serde_json::from_str(cleaned.trim()) {
        Ok(evaluation) => Some(evaluation),
        Err(e) => {
            tracing::warn!(error = %e, "Grader returned unparsable output");
            None
        }
    }
}

/// Text model that rotates through credentials on quota exhaustion
pub struct RotatingModel<B> {
    backend: B,
    keys: KeyRing,
}

impl<B: TextBackend> RotatingModel<B> {
    pub fn new(backend: B, keys: KeyRing) -> Self {
        Self { backend, keys }
    }

    pub fn is_available(&self) -> bool {
        !self.keys.is_exhausted()
    }

    /// `Ok(None)` once every key is exhausted. At most one attempt per key.
    pub async fn complete(&self, prompt: &str) -> Result<Option<String>, ContentError> {
        while let Some((idx, key)) = self.keys.current() {
            let start = Instant::now();
            match self.backend.generate_text(key, prompt).await {
                Ok(text) => {
                    tracing::info!(
                        model = %self.backend.model_id(),
                        key_index = idx,
                        duration_ms = %start.elapsed().as_millis(),
                        "Content request completed"
                    );
                    return Ok(Some(text));
                }
                Err(e) if e.exhausts_key() => {
                    let next = self.keys.retire(idx);
                    tracing::warn!(
                        key_index = idx,
                        next = ?next,
                        error = %e,
                        "Content key exhausted"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        model = %self.backend.model_id(),
                        key_index = idx,
                        error = %e,
                        "Content request failed"
                    );
                    return Err(e);
                }
            }
        }
        tracing::error!("All content keys are exhausted");
        Ok(None)
    }
}

/// Scenario generator backed by a rotating model and per-actor history
pub struct ScenarioService<B> {
    model: RotatingModel<B>,
    history: Arc<dyn QuestionHistory>,
    history_limit: usize,
}

impl<B: TextBackend> ScenarioService<B> {
    pub fn new(
        model: RotatingModel<B>,
        history: Arc<dyn QuestionHistory>,
        history_limit: usize,
    ) -> Self {
        Self {
            model,
            history,
            history_limit,
        }
    }

    /// Recent scenarios to steer away from; history failures only cost
    /// de-duplication
    async fn recent_scenarios(&self, actor: &Actor) -> Vec<String> {
        let cutoff = chrono::Utc::now() - HISTORY_WINDOW;
        if let Err(e) = self.history.purge_older_than(actor.id, cutoff).await {
            tracing::warn!(user_id = actor.id, error = %e, "Could not purge scenario history");
        }
        match self.history.recent(actor.id, self.history_limit).await {
            Ok(recent) => recent,
            Err(e) => {
                tracing::warn!(user_id = actor.id, error = %e, "Could not read scenario history");
                Vec::new()
            }
        }
    }

    async fn remember(&self, actor: &Actor, scenario: &str) {
        if let Err(e) = self.history.record(actor.id, scenario).await {
            tracing::warn!(user_id = actor.id, error = %e, "Could not record scenario");
            return;
        }
        match self.history.trim_to(actor.id, self.history_limit).await {
            Ok(0) => {}
            Ok(pruned) => tracing::debug!(user_id = actor.id, pruned, "Pruned scenario history"),
            Err(e) => tracing::warn!(user_id = actor.id, error = %e, "Could not prune history"),
        }
    }
}

#[async_trait]
impl<B: TextBackend> ContentGenerator for ScenarioService<B> {
    fn is_available(&self) -> bool {
        self.model.is_available()
    }

    async fn generate(&self, actor: &Actor) -> Result<Option<String>, ContentError> {
        if !self.model.is_available() {
            return Ok(None);
        }
        let recent = self.recent_scenarios(actor).await;
        let Some(text) = self.model.complete(&prompts::scenario_prompt(&recent)).await? else {
            return Ok(None);
        };
        let scenario = text.trim().to_string();
        self.remember(actor, &scenario).await;
        Ok(Some(scenario))
    }

    async fn evaluate(
        &self,
        scenario: &str,
        answer: &str,
    ) -> Result<Option<Evaluation>, ContentError> {
        if !self.model.is_available() {
            return Ok(None);
        }
        let prompt = prompts::evaluation_prompt(scenario, answer);
        Ok(self
            .model
            .complete(&prompt)
            .await?
            .as_deref()
            .and_then(parse_evaluation))
    }
}

#[cfg(test)]
mod tests {
    use super::error::ContentErrorKind;
    use super::key_ring::KeyState;
    use super::*;
    use crate::runtime::testing::InMemoryGameStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend returning queued results and recording which key was used
    struct ScriptedBackend {
        results: Mutex<VecDeque<Result<String, ContentError>>>,
        keys_used: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(results: Vec<Result<String, ContentError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                keys_used: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextBackend for ScriptedBackend {
        async fn generate_text(&self, api_key: &str, prompt: &str) -> Result<String, ContentError> {
            self.keys_used.lock().unwrap().push(api_key.to_string());
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ContentError::unknown("script ended")))
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    fn service(
        results: Vec<Result<String, ContentError>>,
        keys: &[&str],
    ) -> (ScenarioService<ScriptedBackend>, Arc<InMemoryGameStore>) {
        let history = Arc::new(InMemoryGameStore::new());
        let model = RotatingModel::new(ScriptedBackend::new(results), KeyRing::new(keys));
        (ScenarioService::new(model, history.clone(), 2), history)
    }

    #[tokio::test]
    async fn test_quota_error_moves_to_next_key() {
        let (svc, _) = service(
            vec![
                Err(ContentError::rate_limit("429")),
                Ok("  Situation: bridge out  ".to_string()),
            ],
            &["k1", "k2"],
        );
        let scenario = svc.generate(&Actor::new(1, "A")).await.unwrap();
        assert_eq!(scenario.as_deref(), Some("Situation: bridge out"));
        assert_eq!(*svc.model.backend.keys_used.lock().unwrap(), vec!["k1", "k2"]);
        assert!(svc.is_available());
    }

    #[tokio::test]
    async fn test_all_keys_exhausted_yields_none() {
        let (svc, _) = service(
            vec![
                Err(ContentError::rate_limit("429")),
                Err(ContentError::invalid_request("quota exceeded")),
            ],
            &["k1", "k2"],
        );
        assert_eq!(svc.generate(&Actor::new(1, "A")).await.unwrap(), None);
        assert!(!svc.is_available());
        // No further backend calls once exhausted
        assert_eq!(svc.generate(&Actor::new(1, "A")).await.unwrap(), None);
        assert_eq!(svc.model.backend.keys_used.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_other_errors_propagate_without_rotation() {
        let (svc, _) = service(vec![Err(ContentError::server_error("500"))], &["k1", "k2"]);
        let err = svc.generate(&Actor::new(1, "A")).await.unwrap_err();
        assert_eq!(err.kind, ContentErrorKind::ServerError);
        assert_eq!(svc.model.keys.state(), KeyState::Active(0));
    }

    #[tokio::test]
    async fn test_history_feeds_prompt_and_is_trimmed() {
        let (svc, history) = service(
            vec![
                Ok("first".to_string()),
                Ok("second".to_string()),
                Ok("third".to_string()),
            ],
            &["k"],
        );
        let actor = Actor::new(7, "A");
        for _ in 0..3 {
            svc.generate(&actor).await.unwrap();
        }
        let prompts = svc.model.backend.prompts.lock().unwrap().clone();
        assert!(prompts[2].contains("- second\n- first"));
        assert_eq!(
            history.recent(7, 10).await.unwrap(),
            vec!["third".to_string(), "second".to_string()]
        );
    }

    #[tokio::test]
    async fn test_evaluate_parses_fenced_json() {
        let raw = "```json\n{\"practicality\":80,\"creativity\":60,\"efficiency\":70,\
                   \"speed\":50,\"risk_assessment\":90,\"feedback\":\"Solid\"}\n```";
        let (svc, _) = service(vec![Ok(raw.to_string()), Ok("not json".to_string())], &["k"]);

        let eval = svc.evaluate("s", "a").await.unwrap().unwrap();
        assert!((eval.average() - 70.0).abs() < f64::EPSILON);
        assert_eq!(eval.feedback, "Solid");

        assert_eq!(svc.evaluate("s", "a").await.unwrap(), None);
    }

    #[test]
    fn test_average_clamps_out_of_range_scores() {
        let eval = Evaluation {
            practicality: 150.0,
            creativity: 100.0,
            efficiency: 100.0,
            speed: 100.0,
            risk_assessment: -20.0,
            feedback: String::new(),
        };
        assert!((eval.average() - 80.0).abs() < f64::EPSILON);
    }
}
