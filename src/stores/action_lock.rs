//! Per-actor guard against overlapping button-driven transitions
//!
//! A blocked attempt is dropped, not queued.

use crate::chat::UserId;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("Actor {0} already has an action in progress")]
    Busy(UserId),
}

#[derive(Debug, Default)]
pub struct ActionLock {
    held: Mutex<HashSet<UserId>>,
}

impl ActionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `actor`; the returned guard releases on drop, on every exit path
    pub fn try_enter(&self, actor: UserId) -> Result<ActionGuard<'_>, LockError> {
        let inserted = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(actor);
        if inserted {
            Ok(ActionGuard { lock: self, actor })
        } else {
            Err(LockError::Busy(actor))
        }
    }

    /// Release `actor`. Always succeeds, including when not held.
    pub fn exit(&self, actor: UserId) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&actor);
    }

    #[cfg(test)]
    pub fn is_held(&self, actor: UserId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&actor)
    }
}

/// Scoped hold on one actor's lock
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ActionGuard<'a> {
    lock: &'a ActionLock,
    actor: UserId,
}

#[cfg(test)]
impl ActionGuard<'_> {
    pub fn actor(&self) -> UserId {
        self.actor
    }
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        self.lock.exit(self.actor);
    }
}
