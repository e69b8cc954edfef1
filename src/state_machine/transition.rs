//! Pure wizard transition function
//!
//! Given the same session, reference data and event, `transition` always
//! produces the same step and effects. All I/O happens in the engine.

use super::state::{Session, SessionUpdate, ShelterDraft, WizardField, WizardStep};
use super::{Effect, Event};
use crate::chat::{InlineButton, InlineKeyboard};
use crate::reference::{Region, RegionLookup, SubRegion};
use thiserror::Error;

/// Most suggestions offered for one free-text answer
pub const MAX_SUGGESTIONS: usize = 5;

/// Payload tag for candidate buttons
pub const CANDIDATE_TAG: &str = "creation";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_step: WizardStep,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(step: WizardStep) -> Self {
        Self {
            new_step: step,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// Whether the session is finished after these effects run
    #[cfg(test)]
    pub fn is_final(&self) -> bool {
        self.effects.iter().any(|e| matches!(e, Effect::Finalize(_)))
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A {field} pick is not valid while {step:?}")]
    WrongStep { step: WizardStep, field: WizardField },
    #[error("No {field} with id {id} in scope")]
    UnknownCandidate { field: WizardField, id: i64 },
    #[error("Session is missing its {0}")]
    Incomplete(&'static str),
}

/// Outcome of resolving free text against named candidates
#[derive(Debug, PartialEq, Eq)]
pub enum Match<'a, T> {
    Exact(&'a T),
    /// At most [`MAX_SUGGESTIONS`], in source order
    Suggestions(Vec<&'a T>),
    NotFound,
}

/// Exact (case-sensitive) name match first, then substring containment.
/// No ranking is applied; source order is kept.
pub fn match_candidates<'a, T, F>(
    input: &str,
    candidates: impl IntoIterator<Item = &'a T>,
    name: F,
) -> Match<'a, T>
where
    T: 'a,
    F: Fn(&T) -> &str,
{
    let input = input.trim();
    if input.is_empty() {
        return Match::NotFound;
    }
    let candidates: Vec<&'a T> = candidates.into_iter().collect();
    if let Some(exact) = candidates.iter().copied().find(|c| name(*c) == input) {
        return Match::Exact(exact);
    }
    let suggestions: Vec<&'a T> = candidates
        .into_iter()
        .filter(|c| name(*c).contains(input))
        .take(MAX_SUGGESTIONS)
        .collect();
    if suggestions.is_empty() {
        Match::NotFound
    } else {
        Match::Suggestions(suggestions)
    }
}

pub fn candidate_payload(field: WizardField, id: i64) -> String {
    format!("{CANDIDATE_TAG}:{field}:{id}")
}

/// Prompt that opens a new wizard
pub fn opening_prompt() -> Effect {
    Effect::prompt(
        format!(
            "🏠 Registering a new shelter (step 1 of {})\n\n\
             Reply to this message with the shelter's name.",
            WizardStep::COUNT
        ),
        SessionUpdate {
            step: Some(WizardStep::AwaitingName),
            ..SessionUpdate::default()
        },
    )
}

/// Pure transition function
pub fn transition(
    session: &Session,
    lookup: &dyn RegionLookup,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (session.step, event) {
        // ============================================================
        // Free-text answers
        // ============================================================
        (WizardStep::AwaitingName, Event::TextReply { text, message_id }) => {
            let name = text.trim();
            if name.is_empty() {
                return Ok(TransitionResult::new(WizardStep::AwaitingName).with_effect(
                    Effect::prompt(
                        "The name cannot be empty. Reply to this message with the shelter's name.",
                        SessionUpdate::default(),
                    )
                    .replying_to(message_id),
                ));
            }
            Ok(TransitionResult::new(WizardStep::AwaitingRegion).with_effect(
                Effect::prompt(
                    format!(
                        "Shelter name: {name}\n\nStep 2 of {}: reply with the shelter's {}.",
                        WizardStep::COUNT,
                        WizardField::Region.label()
                    ),
                    SessionUpdate {
                        step: Some(WizardStep::AwaitingRegion),
                        name: Some(name.to_string()),
                        ..SessionUpdate::default()
                    },
                )
                .replying_to(message_id),
            ))
        }

        (WizardStep::AwaitingRegion, Event::TextReply { text, message_id }) => {
            let scope = lookup.regions();
            let result = match match_candidates(&text, scope, |r: &Region| r.name.as_str()) {
                Match::Exact(region) => region_chosen(region.clone()),
                Match::Suggestions(found) => stay(
                    WizardStep::AwaitingRegion,
                    suggest(
                        WizardField::Region,
                        &text,
                        found.iter().map(|r| (r.id, r.name.as_str())),
                    ),
                ),
                Match::NotFound => stay(
                    WizardStep::AwaitingRegion,
                    not_found(WizardField::Region, &text),
                ),
            };
            Ok(reply_to_all(result, message_id))
        }

        (WizardStep::AwaitingSubRegion, Event::TextReply { text, message_id }) => {
            let region = session
                .fields
                .region
                .as_ref()
                .ok_or(TransitionError::Incomplete("region"))?;
            let scope = lookup.sub_regions_of(region.id);
            let result = match match_candidates(&text, scope, |c: &SubRegion| c.name.as_str()) {
                Match::Exact(sub_region) => finalize(session, sub_region.clone())?,
                Match::Suggestions(found) => stay(
                    WizardStep::AwaitingSubRegion,
                    suggest(
                        WizardField::SubRegion,
                        &text,
                        found.iter().map(|c| (c.id, c.name.as_str())),
                    ),
                ),
                Match::NotFound => stay(
                    WizardStep::AwaitingSubRegion,
                    not_found(WizardField::SubRegion, &text),
                ),
            };
            Ok(reply_to_all(result, message_id))
        }

        // ============================================================
        // Suggestion picks: equivalent to an exact match
        // ============================================================
        (
            step,
            Event::CandidatePicked {
                field,
                candidate_id,
                message_id,
            },
        ) => {
            if step.pickable_field() != Some(field) {
                return Err(TransitionError::WrongStep { step, field });
            }
            let advanced = match field {
                WizardField::Region => {
                    let region = lookup
                        .region(candidate_id)
                        .ok_or(TransitionError::UnknownCandidate { field, id: candidate_id })?;
                    region_chosen(region.clone())
                }
                WizardField::SubRegion => {
                    let region = session
                        .fields
                        .region
                        .as_ref()
                        .ok_or(TransitionError::Incomplete("region"))?;
                    let sub_region = lookup
                        .sub_region(candidate_id)
                        .filter(|c| c.region_id == region.id)
                        .ok_or(TransitionError::UnknownCandidate { field, id: candidate_id })?;
                    finalize(session, sub_region.clone())?
                }
            };
            let mut result = TransitionResult::new(advanced.new_step)
                .with_effect(Effect::DeleteMessage { message_id });
            result.effects.extend(advanced.effects);
            Ok(result)
        }
    }
}

fn stay(step: WizardStep, effect: Effect) -> TransitionResult {
    TransitionResult::new(step).with_effect(effect)
}

fn reply_to_all(mut result: TransitionResult, message_id: i64) -> TransitionResult {
    result.effects = result
        .effects
        .into_iter()
        .map(|e| e.replying_to(message_id))
        .collect();
    result
}

fn region_chosen(region: Region) -> TransitionResult {
    let text = format!(
        "Province: {}\n\nStep 3 of {}: reply with the shelter's {}.",
        region.name,
        WizardStep::COUNT,
        WizardField::SubRegion.label()
    );
    TransitionResult::new(WizardStep::AwaitingSubRegion).with_effect(Effect::prompt(
        text,
        SessionUpdate {
            step: Some(WizardStep::AwaitingSubRegion),
            region: Some(region),
            ..SessionUpdate::default()
        },
    ))
}

fn finalize(session: &Session, sub_region: SubRegion) -> Result<TransitionResult, TransitionError> {
    let name = session
        .fields
        .name
        .clone()
        .ok_or(TransitionError::Incomplete("name"))?;
    let region = session
        .fields
        .region
        .clone()
        .ok_or(TransitionError::Incomplete("region"))?;
    Ok(
        TransitionResult::new(WizardStep::AwaitingSubRegion).with_effect(Effect::Finalize(
            ShelterDraft {
                conversation_id: session.conversation_id,
                initiator: session.initiator,
                name,
                region,
                sub_region,
            },
        )),
    )
}

fn suggest<'a>(
    field: WizardField,
    input: &str,
    found: impl Iterator<Item = (i64, &'a str)>,
) -> Effect {
    let mut keyboard = InlineKeyboard::new();
    for (id, name) in found {
        keyboard.push_row(vec![InlineButton::new(name, candidate_payload(field, id))]);
    }
    Effect::suggestions(
        format!(
            "No {} is named exactly \"{}\". Did you mean one of these? You can also reply again.",
            field.label(),
            input.trim()
        ),
        keyboard,
    )
}

fn not_found(field: WizardField, input: &str) -> Effect {
    Effect::prompt(
        format!(
            "No {} matching \"{}\" was found. Reply to this message with another name.",
            field.label(),
            input.trim()
        ),
        SessionUpdate::default(),
    )
}
