//! Ordered credential list with one-way advancement
//!
//! `Active(0) -> Active(1) -> ... -> Exhausted`. Once exhausted the ring
//! stays exhausted for the life of the process.

use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Active(usize),
    Exhausted,
}

#[derive(Debug)]
pub struct KeyRing {
    keys: Vec<String>,
    state: Mutex<KeyState>,
}

impl KeyRing {
    /// Blank keys are dropped; an empty ring starts exhausted
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let state = if keys.is_empty() {
            KeyState::Exhausted
        } else {
            KeyState::Active(0)
        };
        Self {
            keys,
            state: Mutex::new(state),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn state(&self) -> KeyState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_exhausted(&self) -> bool {
        self.state() == KeyState::Exhausted
    }

    /// Index and value of the key to use next
    pub fn current(&self) -> Option<(usize, &str)> {
        match self.state() {
            KeyState::Active(idx) => self.keys.get(idx).map(|k| (idx, k.as_str())),
            KeyState::Exhausted => None,
        }
    }

    /// Retire key `idx`. A stale index (another request already moved the
    /// ring past it) leaves the state alone.
    pub fn retire(&self, idx: usize) -> KeyState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == KeyState::Active(idx) {
            *state = if idx + 1 < self.keys.len() {
                KeyState::Active(idx + 1)
            } else {
                KeyState::Exhausted
            };
        }
        *state
    }
}
