//! Conversation — the ordered turn list and its session.
//!
//! DESIGN
//! ======
//! Plain data with no I/O. The controller is the only owner; it mutates the
//! conversation in response to commands and backend events and mirrors every
//! change to its view.
//!
//! The session identifier is assigned once, from the first server response
//! that carries a non-blank one, and never overwritten afterwards.

pub mod debounce;
pub mod playback;
pub mod recorder;

use serde::{Deserialize, Serialize};

use crate::markdown;

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;

// =============================================================================
// TURNS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Rendered `content`; lags behind it while an answer streams.
    pub html: Option<String>,
}

impl Turn {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), html: None }
    }

    #[must_use]
    pub fn ai(content: impl Into<String>) -> Self {
        Self { role: Role::Ai, content: content.into(), html: None }
    }
}

// =============================================================================
// CONVERSATION
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    pending: bool,
    session_id: Option<String>,
}

impl Conversation {
    /// Start a conversation, optionally opened by a rendered assistant greeting.
    #[must_use]
    pub fn new(greeting: Option<&str>) -> Self {
        let mut conversation = Self::default();
        if let Some(greeting) = greeting {
            let index = conversation.push_ai(greeting);
            conversation.render(index);
        }
        conversation
    }

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn turn(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub fn pending(&self) -> bool {
        self.pending
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Accept user input: trims it, appends the user turn and marks the
    /// conversation pending. Returns the question and the turn index, or
    /// `None` when the input is blank or an answer is still pending.
    pub fn begin(&mut self, text: &str) -> Option<(String, usize)> {
        let question = text.trim();
        if question.is_empty() || self.pending {
            return None;
        }
        let index = self.push_user(question);
        self.pending = true;
        Some((question.to_owned(), index))
    }

    /// Clear the pending flag.
    pub fn finish(&mut self) {
        self.pending = false;
    }

    pub fn push_user(&mut self, content: &str) -> usize {
        self.turns.push(Turn::user(content));
        self.turns.len() - 1
    }

    pub fn push_ai(&mut self, content: &str) -> usize {
        self.turns.push(Turn::ai(content));
        self.turns.len() - 1
    }

    /// Append streamed text verbatim to a turn.
    pub fn append(&mut self, index: usize, chunk: &str) {
        if let Some(turn) = self.turns.get_mut(index) {
            turn.content.push_str(chunk);
        }
    }

    /// Re-render a turn's HTML from its current content.
    pub fn render(&mut self, index: usize) -> Option<&Turn> {
        let turn = self.turns.get_mut(index)?;
        turn.html = Some(markdown::to_html(&turn.content));
        Some(turn)
    }

    /// Adopt `id` as the session identifier unless one is already set.
    /// Blank identifiers are ignored. Returns whether `id` was adopted.
    pub fn adopt_session(&mut self, id: &str) -> bool {
        if self.session_id.is_some() || id.trim().is_empty() {
            return false;
        }
        self.session_id = Some(id.to_owned());
        true
    }
}
