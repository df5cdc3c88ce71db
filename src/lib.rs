//! Glimpse core — inference orchestration and pipeline state for a
//! capture-to-solution assistant.
//!
//! The presentation shell (window chrome, rendering, shortcuts, settings
//! persistence) lives outside this crate. It drives the
//! [`pipeline::PipelineController`] through its documented actions and
//! observes the session through the [`events::EventBus`]; OS-level screen
//! capture plugs in behind [`capture::CaptureSource`], and the inference
//! provider behind [`gateway::InferenceProvider`].

pub mod capture;
pub mod config;
pub mod conversation;
pub mod events;
pub mod gateway;
pub mod pipeline;

pub use capture::{CaptureSource, CapturedImage, QueueSelector};
pub use config::AppConfig;
pub use conversation::{ConversationLog, ConversationTurn, Role};
pub use events::{EventBus, PipelineEvent, Subscription};
pub use gateway::{HttpProvider, InferenceGateway, InferenceProvider};
pub use pipeline::{PipelineController, SessionState, VoiceAudio};

use tracing_subscriber::EnvFilter;

/// Initialize tracing with `RUST_LOG` or the crate default filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
