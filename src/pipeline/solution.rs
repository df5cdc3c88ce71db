//! Structured solution payloads — strict schema, typed degraded variant.
//!
//! The provider is instructed to answer with a fenced JSON block. Parsing
//! applies explicit field presence/type checks; anything that does not
//! match the schema degrades to a best-effort record that embeds the raw
//! text in `thoughts` instead of failing the solve. Extraction responses
//! (problem statement + reference code) get the same treatment: raw text
//! becomes the statement when the JSON shape is absent.

use serde::{Deserialize, Serialize};

/// Placeholder emitted when the provider's output carried no usable code.
pub const DEGRADED_CODE_PLACEHOLDER: &str =
    "// No code block could be recovered from the model output; see the notes above.";

const UNKNOWN_COMPLEXITY: &str = "unknown";

// ═══════════════════════════════════════════════════════════
// Payload types
// ═══════════════════════════════════════════════════════════

/// A structured solution as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionPayload {
    pub short_answer: Option<String>,
    pub code: String,
    pub thoughts: Vec<String>,
    pub time_complexity: String,
    pub space_complexity: String,
    /// True when the provider output failed schema validation and this
    /// record is the best-effort fallback.
    #[serde(default)]
    pub degraded: bool,
}

impl SolutionPayload {
    /// One-line summary for the assistant conversation turn.
    pub fn summary_line(&self) -> String {
        if let Some(short) = self.short_answer.as_deref() {
            if !short.trim().is_empty() {
                return short.trim().to_string();
            }
        }
        if let Some(first) = self.thoughts.first() {
            if !first.trim().is_empty() {
                return first.trim().to_string();
            }
        }
        format!(
            "Provided a solution ({} time, {} space).",
            self.time_complexity, self.space_complexity
        )
    }
}

/// Result of the extraction call: what problem is on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedProblem {
    pub statement: String,
    pub reference_code: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════

/// Strict shape the solve prompt asks for. Field presence and types are
/// enforced here; a mismatch degrades rather than erroring.
#[derive(Deserialize)]
struct RawSolution {
    short_answer: Option<String>,
    code: String,
    #[serde(default)]
    thoughts: Vec<String>,
    time_complexity: String,
    space_complexity: String,
}

#[derive(Deserialize)]
struct RawExtraction {
    problem_statement: String,
    reference_code: Option<String>,
}

/// Parse a solve response. Never fails: schema mismatch yields a degraded
/// record carrying the raw text.
pub fn parse_solution(raw: &str) -> SolutionPayload {
    match extract_json_block(raw).and_then(|json| serde_json::from_str::<RawSolution>(&json).ok())
    {
        Some(parsed) => SolutionPayload {
            short_answer: parsed.short_answer.filter(|s| !s.trim().is_empty()),
            code: parsed.code,
            thoughts: parsed.thoughts,
            time_complexity: parsed.time_complexity,
            space_complexity: parsed.space_complexity,
            degraded: false,
        },
        None => {
            tracing::warn!(response_len = raw.len(), "solution response failed schema; degrading");
            degraded_solution(raw)
        }
    }
}

/// Parse an extraction response. Raw text degrades to the statement.
pub fn parse_extraction(raw: &str) -> ExtractedProblem {
    match extract_json_block(raw)
        .and_then(|json| serde_json::from_str::<RawExtraction>(&json).ok())
    {
        Some(parsed) => ExtractedProblem {
            statement: parsed.problem_statement.trim().to_string(),
            reference_code: parsed
                .reference_code
                .filter(|c| !c.trim().is_empty()),
        },
        None => {
            tracing::warn!(response_len = raw.len(), "extraction response failed schema; using raw text");
            ExtractedProblem {
                statement: raw.trim().to_string(),
                reference_code: None,
            }
        }
    }
}

fn degraded_solution(raw: &str) -> SolutionPayload {
    SolutionPayload {
        short_answer: None,
        code: DEGRADED_CODE_PLACEHOLDER.to_string(),
        thoughts: vec![raw.trim().to_string()],
        time_complexity: UNKNOWN_COMPLEXITY.to_string(),
        space_complexity: UNKNOWN_COMPLEXITY.to_string(),
        degraded: true,
    }
}

/// Locate the JSON payload inside a model response: a ```json fence if
/// present, else the outermost brace span, else nothing.
fn extract_json_block(response: &str) -> Option<String> {
    if let Some(fence_start) = response.find("```json") {
        let content_start = fence_start + 7;
        if let Some(fence_len) = response[content_start..].find("```") {
            return Some(response[content_start..content_start + fence_len].trim().to_string());
        }
    }
    let open = response.find('{')?;
    let close = response.rfind('}')?;
    if close <= open {
        return None;
    }
    Some(response[open..=close].trim().to_string())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
