//! Runtime configuration for the inference core.
//!
//! One `AppConfig` value covers the whole configuration surface: provider
//! credential and endpoint, preferred starting model, response language,
//! retry pacing, per-request time budget, conversation window, and the
//! secondary-queue capacity. Defaults work out of the box; `from_env()`
//! applies `GLIMPSE_*` overrides for anything the settings layer (out of
//! scope here) has not injected directly.

use std::time::Duration;

use crate::gateway::models::DEFAULT_MODEL;

/// Application-level constants
pub const APP_NAME: &str = "Glimpse";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    "glimpse=info".to_string()
}

/// Complete configuration surface consumed by the core.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Provider credential. Empty means "not configured" — the provider
    /// reports `AuthMissing` on the first call rather than panicking.
    pub api_key: String,
    /// Provider endpoint root, no trailing slash.
    pub base_url: String,
    /// User-selected starting model; the fallback chain begins here.
    pub preferred_model: String,
    /// Target language for generated answers (BCP 47-ish tag).
    pub response_language: String,
    /// Fixed pause between fallback rotations and before a transient retry.
    pub retry_base_delay: Duration,
    /// Upper bound on any single retry pause.
    pub retry_max_delay: Duration,
    /// Per-request time budget. A timeout classifies as a transient
    /// network failure.
    pub request_timeout: Duration,
    /// Conversation window K: `context_string()` renders the K most recent
    /// turns; the log itself retains 2K.
    pub conversation_window: usize,
    /// Maximum follow-up images held for debugging.
    pub secondary_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            preferred_model: DEFAULT_MODEL.to_string(),
            response_language: "en".to_string(),
            retry_base_delay: Duration::from_millis(2_000),
            retry_max_delay: Duration::from_millis(10_000),
            request_timeout: Duration::from_secs(60),
            conversation_window: 10,
            secondary_capacity: 2,
        }
    }
}

impl AppConfig {
    /// Defaults with `GLIMPSE_*` environment overrides applied.
    ///
    /// Unparseable values fall back to the default silently — a malformed
    /// override must never keep the pipeline from starting.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env_string("GLIMPSE_API_KEY", defaults.api_key),
            base_url: trim_trailing_slash(env_string("GLIMPSE_BASE_URL", defaults.base_url)),
            preferred_model: env_string("GLIMPSE_MODEL", defaults.preferred_model),
            response_language: env_string("GLIMPSE_LANGUAGE", defaults.response_language),
            retry_base_delay: Duration::from_millis(env_parse(
                "GLIMPSE_RETRY_BASE_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )),
            retry_max_delay: Duration::from_millis(env_parse(
                "GLIMPSE_RETRY_MAX_MS",
                defaults.retry_max_delay.as_millis() as u64,
            )),
            request_timeout: Duration::from_secs(env_parse(
                "GLIMPSE_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            conversation_window: env_parse(
                "GLIMPSE_CONTEXT_WINDOW",
                defaults.conversation_window,
            ),
            secondary_capacity: env_parse(
                "GLIMPSE_SECONDARY_CAP",
                defaults.secondary_capacity,
            ),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn trim_trailing_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
