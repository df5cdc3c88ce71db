//! Fallback-chain executor — the rotation/retry loop behind
//! `InferenceGateway::execute`.
//!
//! Guarantees, per logical call:
//! - candidates are attempted strictly in chain order
//! - at most one attempt per candidate, except `NetworkTransient` which
//!   earns exactly one retry of the same candidate before rotation
//! - `AuthMissing` and cancellation short-circuit the whole chain
//! - exactly one `ModelUsed` event on success, no events otherwise
//! - a cancel during a backoff pause aborts promptly

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::provider::{InferenceProvider, ProviderError};
use super::{consolidated_message, FailureKind, GatewayError, InferenceOutcome, InferenceRequest};
use crate::config::AppConfig;
use crate::events::{EventBus, PipelineEvent};

// ═══════════════════════════════════════════════════════════
// Retry policy
// ═══════════════════════════════════════════════════════════

/// Fixed-pace backoff: one base-delay pause before rotating away from a
/// rate-limited candidate or retrying a transient failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    fn pause_duration(&self) -> Duration {
        self.base_delay.min(self.max_delay)
    }
}

// ═══════════════════════════════════════════════════════════
// InferenceGateway
// ═══════════════════════════════════════════════════════════

pub struct InferenceGateway {
    provider: Arc<dyn InferenceProvider>,
    retry: RetryPolicy,
    bus: EventBus,
    last_model: Mutex<Option<String>>,
}

impl InferenceGateway {
    pub fn new(provider: Arc<dyn InferenceProvider>, retry: RetryPolicy, bus: EventBus) -> Self {
        Self {
            provider,
            retry,
            bus,
            last_model: Mutex::new(None),
        }
    }

    /// The model that served the most recent successful call.
    pub fn last_used_model(&self) -> Option<String> {
        self.last_model.lock().ok().and_then(|m| m.clone())
    }

    /// Execute one logical request against the fallback chain.
    pub async fn execute(
        &self,
        request: &InferenceRequest,
        chain: &[String],
        token: &CancellationToken,
    ) -> Result<InferenceOutcome, GatewayError> {
        let mut last_failure: Option<ProviderError> = None;

        for (index, model) in chain.iter().enumerate() {
            if token.is_cancelled() {
                return Err(GatewayError::Canceled);
            }
            let has_next = index + 1 < chain.len();

            match self.provider.generate(model, request, token).await {
                Ok(text) => return Ok(self.succeed(model, text)),
                Err(err) => match err.kind {
                    FailureKind::Canceled => return Err(GatewayError::Canceled),
                    FailureKind::AuthMissing => {
                        return Err(GatewayError::AuthMissing(err.message))
                    }
                    FailureKind::RateLimited => {
                        tracing::warn!(model = %model, "candidate rate-limited; rotating");
                        last_failure = Some(err);
                        // No pause after the final candidate
                        if has_next {
                            self.pause(token).await?;
                        }
                    }
                    FailureKind::NetworkTransient => {
                        tracing::warn!(model = %model, error = %err, "transient failure; retrying candidate once");
                        self.pause(token).await?;
                        match self.provider.generate(model, request, token).await {
                            Ok(text) => return Ok(self.succeed(model, text)),
                            Err(retry_err) => match retry_err.kind {
                                FailureKind::Canceled => return Err(GatewayError::Canceled),
                                FailureKind::AuthMissing => {
                                    return Err(GatewayError::AuthMissing(retry_err.message))
                                }
                                _ => {
                                    tracing::warn!(model = %model, error = %retry_err, "retry failed; rotating");
                                    last_failure = Some(retry_err);
                                }
                            },
                        }
                    }
                    FailureKind::MalformedResponse | FailureKind::Unknown => {
                        tracing::warn!(model = %model, error = %err, kind = %err.kind, "candidate failed; rotating");
                        last_failure = Some(err);
                    }
                },
            }
        }

        let kind = last_failure
            .map(|e| e.kind)
            .unwrap_or(FailureKind::Unknown);
        tracing::error!(chain_len = chain.len(), last_kind = %kind, "fallback chain exhausted");
        Err(GatewayError::Exhausted {
            kind,
            message: consolidated_message(kind),
        })
    }

    fn succeed(&self, model: &str, text: String) -> InferenceOutcome {
        tracing::info!(model = %model, response_len = text.len(), "inference succeeded");
        if let Ok(mut last) = self.last_model.lock() {
            *last = Some(model.to_string());
        }
        self.bus.emit(PipelineEvent::ModelUsed {
            model: model.to_string(),
        });
        InferenceOutcome {
            model: model.to_string(),
            text,
        }
    }

    /// Base-delay pause that a cancel aborts promptly.
    async fn pause(&self, token: &CancellationToken) -> Result<(), GatewayError> {
        tokio::select! {
            _ = token.cancelled() => Err(GatewayError::Canceled),
            _ = tokio::time::sleep(self.retry.pause_duration()) => Ok(()),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
