//! Pipeline — the session state machine and everything it sequences.
//!
//! - `session` — the explicit session value (state, problem context,
//!   debug flag) owned by the controller
//! - `solution` — strict structured-solution schema with a typed degraded
//!   variant for unusable provider output
//! - `prompts` — prompt templates and request builders for every flow
//! - `controller` — the state machine: capture → extraction → solving →
//!   debugging → reset
//! - `voice` — the voice turn adapter (spoken questions enter without
//!   captures)

pub mod controller;
pub mod prompts;
pub mod session;
pub mod solution;
pub mod voice;

pub use controller::{PipelineController, QueueSnapshot};
pub use session::{ProblemContext, Session, SessionState};
pub use solution::{ExtractedProblem, SolutionPayload};
pub use voice::VoiceAudio;

use thiserror::Error;

use crate::capture::CaptureError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
}
