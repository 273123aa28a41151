// Chat transcript: an append-only sequence of user and assistant turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Ordered chat history for one session.
///
/// Entries are only ever appended. The full history is kept for display;
/// [`Transcript::recent_window`] bounds what is sent upstream. Identical
/// consecutive turns are kept as-is: de-duplicating retried replies is the
/// caller's job.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last `max_turns` entries, trimmed so the window starts with a
    /// user turn (chat APIs reject a leading assistant message).
    pub fn recent_window(&self, max_turns: usize) -> &[TranscriptEntry] {
        let start = self.entries.len().saturating_sub(max_turns);
        let window = &self.entries[start..];
        let first_user = window
            .iter()
            .position(|e| e.role == Role::User)
            .unwrap_or(window.len());
        &window[first_user..]
    }
}
