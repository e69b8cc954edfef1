//! Shelter registration wizard as a pure state machine
//!
//! `transition` maps (session, event) to a new step plus effects; the
//! wizard engine performs the effects against the transport and stores.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{Session, SessionUpdate, ShelterDraft, WizardField};
pub use transition::{
    candidate_payload, opening_prompt, transition, TransitionError, CANDIDATE_TAG,
};
