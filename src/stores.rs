//! Process-wide conversational state: reply correlation, the active menu
//! message, and the per-actor action lock
//!
//! Each store is keyed by conversation or actor id and every operation is
//! atomic for the key it touches.

pub mod action_lock;
pub mod active_message;
pub mod correlation;

pub use action_lock::ActionLock;
pub use active_message::{delete_quietly, ActiveMessageTracker};
pub use correlation::{
    Correlation, CorrelationError, DonationKind, DonationPromptRepository,
    InMemoryDonationPrompts, InMemorySessionRepository, SessionRepository,
};
