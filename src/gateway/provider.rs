//! Provider seam — the async client trait, the HTTP implementation, and a
//! scripted double for tests.
//!
//! `HttpProvider` speaks the generateContent JSON dialect: system
//! instruction, one user content with text + inline media parts, and a
//! candidates array in the response. Classification of failures into
//! `FailureKind` happens here, at the transport boundary, so the executor
//! only ever reasons about the taxonomy.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{FailureKind, InferenceRequest};
use crate::config::AppConfig;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// One failed provider attempt, already classified.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn canceled() -> Self {
        Self::new(FailureKind::Canceled, "request canceled")
    }
}

// ═══════════════════════════════════════════════════════════
// Trait
// ═══════════════════════════════════════════════════════════

/// Async inference provider. One call = one attempt against one model;
/// rotation and retries belong to the executor, not here.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        request: &InferenceRequest,
        token: &CancellationToken,
    ) -> Result<String, ProviderError>;
}

// ═══════════════════════════════════════════════════════════
// HttpProvider
// ═══════════════════════════════════════════════════════════

/// Production provider over the generateContent HTTP API.
pub struct HttpProvider {
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(config: &AppConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: config.request_timeout,
            client,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

// ── Wire types ──────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Instruction<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Instruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData<'a>>,
}

impl<'a> Part<'a> {
    fn text(text: &'a str) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }

    fn media(mime_type: &'a str, data: &'a str) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData { mime_type, data }),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn build_body<'a>(request: &'a InferenceRequest) -> GenerateRequest<'a> {
    let mut parts = vec![Part::text(&request.user)];
    for media in &request.media {
        parts.push(Part::media(&media.mime_type, &media.data_base64));
    }
    GenerateRequest {
        system_instruction: Instruction {
            parts: vec![Part::text(&request.system)],
        },
        contents: vec![Content {
            role: "user",
            parts,
        }],
    }
}

fn classify_status(status: reqwest::StatusCode) -> FailureKind {
    match status.as_u16() {
        429 => FailureKind::RateLimited,
        401 | 403 => FailureKind::AuthMissing,
        408 => FailureKind::NetworkTransient,
        s if s >= 500 => FailureKind::NetworkTransient,
        _ => FailureKind::Unknown,
    }
}

fn classify_transport(e: &reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::new(
            FailureKind::NetworkTransient,
            format!("request timed out after {}s", timeout.as_secs()),
        )
    } else if e.is_connect() {
        ProviderError::new(
            FailureKind::NetworkTransient,
            format!("connection failed: {e}"),
        )
    } else {
        ProviderError::new(FailureKind::Unknown, format!("http error: {e}"))
    }
}

#[async_trait]
impl InferenceProvider for HttpProvider {
    async fn generate(
        &self,
        model: &str,
        request: &InferenceRequest,
        token: &CancellationToken,
    ) -> Result<String, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::new(
                FailureKind::AuthMissing,
                "no provider credential configured",
            ));
        }

        let body = build_body(request);
        let send = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = token.cancelled() => return Err(ProviderError::canceled()),
            result = send => result.map_err(|e| classify_transport(&e, self.timeout))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                classify_status(status),
                format!("provider returned status {status}: {body}"),
            ));
        }

        let parsed: GenerateResponse = tokio::select! {
            _ = token.cancelled() => return Err(ProviderError::canceled()),
            result = response.json() => result.map_err(|e| {
                ProviderError::new(FailureKind::MalformedResponse, format!("body decode failed: {e}"))
            })?,
        };

        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::new(
                FailureKind::MalformedResponse,
                "response contained no text",
            ));
        }

        Ok(text)
    }
}

// ═══════════════════════════════════════════════════════════
// ScriptedProvider — test double
// ═══════════════════════════════════════════════════════════

/// One scripted attempt outcome.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Succeed(String),
    Fail(FailureKind, String),
    /// Block until the token fires, then report `Canceled`. Lets tests
    /// exercise reset/capture racing an in-flight call.
    HangUntilCancel,
}

/// Scripted provider for tests — pops one step per attempt and records the
/// model each attempt targeted.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ScriptStep>>,
    attempts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Models targeted so far, one entry per attempt, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn generate(
        &self,
        model: &str,
        _request: &InferenceRequest,
        token: &CancellationToken,
    ) -> Result<String, ProviderError> {
        if token.is_cancelled() {
            return Err(ProviderError::canceled());
        }
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(model.to_string());
        }
        let step = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(ScriptStep::Fail(
                FailureKind::Unknown,
                "script exhausted".into(),
            ));
        match step {
            ScriptStep::Succeed(text) => Ok(text),
            ScriptStep::Fail(kind, message) => Err(ProviderError::new(kind, message)),
            ScriptStep::HangUntilCancel => {
                token.cancelled().await;
                Err(ProviderError::canceled())
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        use reqwest::StatusCode;
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            FailureKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            FailureKind::AuthMissing
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            FailureKind::AuthMissing
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            FailureKind::NetworkTransient
        );
        assert_eq!(
            classify_status(StatusCode::REQUEST_TIMEOUT),
            FailureKind::NetworkTransient
        );
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), FailureKind::Unknown);
    }

    #[test]
    fn body_carries_system_user_and_media() {
        let request = InferenceRequest {
            system: "be brief".into(),
            user: "what is this?".into(),
            media: vec![crate::gateway::MediaPart {
                mime_type: "image/png".into(),
                data_base64: "AAAA".into(),
            }],
        };
        let json = serde_json::to_value(build_body(&request)).unwrap();

        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            serde_json::json!("be brief")
        );
        assert_eq!(json["contents"][0]["role"], serde_json::json!("user"));
        assert_eq!(
            json["contents"][0]["parts"][0]["text"],
            serde_json::json!("what is this?")
        );
        assert_eq!(
            json["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            serde_json::json!("image/png")
        );
    }

    #[test]
    fn response_text_joins_parts() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"hello "},{"text":"world"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn missing_credential_is_auth_missing() {
        let provider = HttpProvider::new(&AppConfig::default());
        let err = provider
            .generate(
                "gemini-2.5-flash",
                &InferenceRequest::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::AuthMissing);
    }

    #[tokio::test]
    async fn scripted_provider_pops_in_order() {
        let provider = ScriptedProvider::new(vec![
            ScriptStep::Fail(FailureKind::RateLimited, "quota".into()),
            ScriptStep::Succeed("answer".into()),
        ]);
        let token = CancellationToken::new();
        let request = InferenceRequest::default();

        let first = provider.generate("model-a", &request, &token).await;
        assert_eq!(first.unwrap_err().kind, FailureKind::RateLimited);

        let second = provider.generate("model-b", &request, &token).await;
        assert_eq!(second.unwrap(), "answer");

        assert_eq!(provider.attempts(), vec!["model-a", "model-b"]);
    }

    #[tokio::test]
    async fn scripted_provider_respects_pre_cancel() {
        let provider = ScriptedProvider::new(vec![ScriptStep::Succeed("never".into())]);
        let token = CancellationToken::new();
        token.cancel();

        let result = provider
            .generate("model-a", &InferenceRequest::default(), &token)
            .await;
        assert_eq!(result.unwrap_err().kind, FailureKind::Canceled);
        assert_eq!(provider.attempt_count(), 0);
    }

    #[tokio::test]
    async fn scripted_hang_resolves_on_cancel() {
        let provider =
            std::sync::Arc::new(ScriptedProvider::new(vec![ScriptStep::HangUntilCancel]));
        let token = CancellationToken::new();

        let call = {
            let provider = provider.clone();
            let token = token.clone();
            tokio::spawn(async move {
                provider
                    .generate("model-a", &InferenceRequest::default(), &token)
                    .await
            })
        };

        tokio::task::yield_now().await;
        token.cancel();
        let result = call.await.unwrap();
        assert_eq!(result.unwrap_err().kind, FailureKind::Canceled);
    }
}
