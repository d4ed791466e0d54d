use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use teloxide::types::UserId;

/// Number of turns kept as completion context.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    history: VecDeque<ChatTurn>,
    voice_enabled: bool,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            history: VecDeque::with_capacity(HISTORY_LIMIT + 1),
            voice_enabled: true,
        }
    }
}

impl Session {
    fn push(&mut self, turn: ChatTurn) {
        self.history.push_back(turn);
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }
}

/// Per-user conversation state, shared between dispatcher handlers.
///
/// Entries are created lazily on first access and removed by [`SessionStore::reset`].
/// The lock is only held for the duration of a single accessor.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<UserId, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user_turn(&self, user: UserId, text: &str) {
        self.sessions
            .lock()
            .entry(user)
            .or_default()
            .push(ChatTurn::user(text));
    }

    pub fn append_assistant_turn(&self, user: UserId, text: &str) {
        self.sessions
            .lock()
            .entry(user)
            .or_default()
            .push(ChatTurn::assistant(text));
    }

    pub fn history(&self, user: UserId) -> Vec<ChatTurn> {
        self.sessions
            .lock()
            .get(&user)
            .map(|session| session.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn reset(&self, user: UserId) {
        self.sessions.lock().remove(&user);
    }

    pub fn set_voice_enabled(&self, user: UserId, enabled: bool) {
        self.sessions.lock().entry(user).or_default().voice_enabled = enabled;
    }

    pub fn is_voice_enabled(&self, user: UserId) -> bool {
        self.sessions
            .lock()
            .get(&user)
            .map(|session| session.voice_enabled)
            .unwrap_or(true)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}
