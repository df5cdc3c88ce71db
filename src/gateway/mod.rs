//! Inference gateway — one logical request against an ordered multi-model
//! fallback chain, with per-candidate retry, fixed-pace backoff, and
//! cooperative cancellation.
//!
//! Layering:
//! - `models` — the static priority table and the pure fallback policy
//! - `provider` — the async provider seam (HTTP implementation + scripted
//!   test double)
//! - `executor` — `InferenceGateway::execute`, the rotation/retry loop

pub mod executor;
pub mod models;
pub mod provider;

pub use executor::{InferenceGateway, RetryPolicy};
pub use models::{chain_from, DEFAULT_MODEL, MODEL_PRIORITY};
pub use provider::{HttpProvider, InferenceProvider, ProviderError, ScriptStep, ScriptedProvider};

use std::fmt;

use serde::Serialize;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════
// Failure taxonomy
// ═══════════════════════════════════════════════════════════

/// Classification of a failed provider attempt. Drives the gateway's
/// rotation and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Provider refused for quota reasons; rotate, never retry the same
    /// candidate.
    RateLimited,
    /// Connection/timeout class; retry the same candidate exactly once.
    NetworkTransient,
    /// Credential missing or rejected; the whole call fails immediately.
    AuthMissing,
    /// The provider answered but the body was unusable.
    MalformedResponse,
    /// The cancellation token fired.
    Canceled,
    /// Anything else; rotate without retry.
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::NetworkTransient => write!(f, "network_transient"),
            Self::AuthMissing => write!(f, "auth_missing"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::Canceled => write!(f, "canceled"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Request / outcome types
// ═══════════════════════════════════════════════════════════

/// Inline media payload (image or audio), already base64-encoded.
#[derive(Debug, Clone)]
pub struct MediaPart {
    pub mime_type: String,
    pub data_base64: String,
}

impl MediaPart {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        use base64::Engine as _;
        Self {
            mime_type: mime_type.into(),
            data_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// One logical request, independent of which candidate ends up serving it.
#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    pub system: String,
    pub user: String,
    pub media: Vec<MediaPart>,
}

/// Successful gateway result: which model answered, and with what.
#[derive(Debug, Clone)]
pub struct InferenceOutcome {
    pub model: String,
    pub text: String,
}

// ═══════════════════════════════════════════════════════════
// Gateway errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The call was canceled cooperatively. Reported with a distinct
    /// message upstream — never with a "try again" suggestion.
    #[error("request canceled")]
    Canceled,

    /// Credential missing or rejected. Short-circuits the chain.
    #[error("provider credential missing or rejected: {0}")]
    AuthMissing(String),

    /// Every candidate failed. `kind` is the last observed classification;
    /// `message` is the consolidated user-facing text derived from it.
    #[error("{message}")]
    Exhausted { kind: FailureKind, message: String },
}

impl GatewayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Canceled => FailureKind::Canceled,
            Self::AuthMissing(_) => FailureKind::AuthMissing,
            Self::Exhausted { kind, .. } => *kind,
        }
    }
}

/// Single consolidated user-facing message for an exhausted chain,
/// derived from the last observed failure's classification.
pub(crate) fn consolidated_message(kind: FailureKind) -> String {
    match kind {
        FailureKind::RateLimited => {
            "All available models are currently rate-limited. Wait a moment and try again.".into()
        }
        FailureKind::NetworkTransient => {
            "Could not reach the inference provider. Check your connection and try again.".into()
        }
        FailureKind::MalformedResponse => {
            "The inference provider returned an unusable response.".into()
        }
        FailureKind::AuthMissing => {
            "No valid provider credential is configured.".into()
        }
        FailureKind::Canceled => "The request was canceled.".into(),
        FailureKind::Unknown => "The request failed on every available model.".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_part_encodes_base64() {
        let part = MediaPart::from_bytes("image/png", b"fakepng");
        assert_eq!(part.mime_type, "image/png");
        assert_eq!(part.data_base64, "ZmFrZXBuZw==");
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
        assert_eq!(FailureKind::NetworkTransient.to_string(), "network_transient");
    }

    #[test]
    fn gateway_error_kind_roundtrip() {
        assert_eq!(GatewayError::Canceled.kind(), FailureKind::Canceled);
        assert_eq!(
            GatewayError::AuthMissing("no key".into()).kind(),
            FailureKind::AuthMissing
        );
        let exhausted = GatewayError::Exhausted {
            kind: FailureKind::Unknown,
            message: consolidated_message(FailureKind::Unknown),
        };
        assert_eq!(exhausted.kind(), FailureKind::Unknown);
    }

    #[test]
    fn consolidated_messages_are_user_facing() {
        // The canceled message must not suggest retrying
        let canceled = consolidated_message(FailureKind::Canceled);
        assert!(!canceled.to_lowercase().contains("try again"));
        // Quota and network messages do suggest retrying
        assert!(consolidated_message(FailureKind::RateLimited).contains("try again"));
        assert!(consolidated_message(FailureKind::NetworkTransient).contains("try again"));
    }
}
