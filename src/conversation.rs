//! Bounded conversation memory for prompt continuity.
//!
//! The log retains at most 2K turns (K = configured window); the rendered
//! prompt context covers only the most recent K, each truncated at a fixed
//! character ceiling. Memory lives for the process only — nothing is
//! persisted, and `clear()` wipes it on session reset.
//!
//! No internal locking: the pipeline controller is the single writer and
//! serializes access.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-turn character ceiling applied when rendering prompt context.
pub const TURN_CHAR_CEILING: usize = 500;

/// Marker appended to a truncated turn.
const ELLIPSIS: &str = "…";

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Assistant"),
        }
    }
}

/// One retained exchange message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// ConversationLog
// ═══════════════════════════════════════════════════════════

/// Append-only bounded deque of conversation turns.
#[derive(Debug)]
pub struct ConversationLog {
    turns: VecDeque<ConversationTurn>,
    /// Window K. Stored capacity is 2K; rendered context is K.
    window: usize,
}

impl ConversationLog {
    pub fn new(window: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(window * 2),
            window,
        }
    }

    fn capacity(&self) -> usize {
        self.window * 2
    }

    /// Append a turn, silently dropping the oldest beyond capacity.
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity() {
            self.turns.pop_front();
        }
    }

    /// Render the most recent K turns as `"<Role>: <content>"` lines
    /// joined by blank lines. Each turn's content is truncated at
    /// `TURN_CHAR_CEILING` characters with a trailing ellipsis marker.
    pub fn context_string(&self) -> String {
        let skip = self.turns.len().saturating_sub(self.window);
        self.turns
            .iter()
            .skip(skip)
            .map(|turn| format!("{}: {}", turn.role, truncate_turn(&turn.content)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Truncate at the character ceiling without splitting a UTF-8 scalar.
fn truncate_turn(content: &str) -> String {
    match content.char_indices().nth(TURN_CHAR_CEILING) {
        None => content.to_string(),
        Some((byte_idx, _)) => format!("{}{}", &content[..byte_idx], ELLIPSIS),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
