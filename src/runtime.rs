//! Runtime: collaborator traits and the event loop that feeds the dispatcher

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{BotRuntime, EventSource};
pub use traits::*;
