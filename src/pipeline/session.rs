//! Session state — one explicit value owned by the pipeline controller.
//!
//! No module-level globals: the controller holds the `Session` and passes
//! data out by value. Queues and conversation memory live beside it in the
//! controller; this type covers the state machine position, the problem
//! context singleton, and the debug flag.

use std::fmt;

use serde::Serialize;

use super::solution::SolutionPayload;

/// Position in the capture → extraction → solving → debugging cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for captures / idle.
    #[default]
    Queue,
    /// Extraction call in flight.
    Extracting,
    /// Solution call in flight.
    Solving,
    /// A solution is on screen; follow-ups are possible.
    Solved,
    /// Debug call in flight.
    Debugging,
}

impl SessionState {
    /// A non-terminal transition sequence is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Extracting | Self::Solving | Self::Debugging)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => write!(f, "queue"),
            Self::Extracting => write!(f, "extracting"),
            Self::Solving => write!(f, "solving"),
            Self::Solved => write!(f, "solved"),
            Self::Debugging => write!(f, "debugging"),
        }
    }
}

/// The per-session problem singleton. Created on successful extraction,
/// updated on solve/debug, cleared on reset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemContext {
    pub statement: String,
    pub reference_code: Option<String>,
    pub solution: Option<SolutionPayload>,
}

impl ProblemContext {
    pub fn new(statement: String, reference_code: Option<String>) -> Self {
        Self {
            statement,
            reference_code,
            solution: None,
        }
    }
}

/// Everything the state machine mutates.
#[derive(Debug, Default)]
pub struct Session {
    pub state: SessionState,
    pub problem: Option<ProblemContext>,
    pub has_debugged: bool,
}

impl Session {
    /// Back to a fresh session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
