//! Prompt templates and request builders for every pipeline flow.
//!
//! Each flow gets a system prompt constant plus a builder that assembles
//! the full `InferenceRequest` (text + media parts). The solve and debug
//! prompts ask for answers in the configured response language; the
//! structured flows pin the exact JSON shape the parser validates.

use crate::conversation::ConversationLog;
use crate::gateway::{InferenceRequest, MediaPart};
use crate::pipeline::session::ProblemContext;

// ═══════════════════════════════════════════════════════════
// System prompts
// ═══════════════════════════════════════════════════════════

const EXTRACTION_SYSTEM: &str = "\
You are a problem extractor. The images show a programming problem as it \
appears on screen. Read ALL visible text carefully. Reply with a JSON object \
only: {\"problem_statement\": string, \"reference_code\": string|null}. \
problem_statement is the complete problem including constraints and examples; \
reference_code is any starter/template code visible, or null.";

const SOLVE_SYSTEM: &str = "\
You are an expert competitive programmer. Produce a correct, idiomatic \
solution to the given problem. Reply with a JSON object only, inside a \
```json fence: {\"short_answer\": string|null, \"code\": string, \
\"thoughts\": [string], \"time_complexity\": string, \
\"space_complexity\": string}. thoughts is 2-4 short reasoning steps; \
complexities use big-O notation.";

const DEBUG_SYSTEM: &str = "\
You are a code reviewer helping debug a solution. The first image shows the \
original problem; later images show error messages, failing tests, or edited \
code. Explain what is wrong and how to fix it, referencing the current \
solution. Answer as concise Markdown, no JSON.";

const TRANSCRIBE_SYSTEM: &str = "\
You are a transcription engine. Transcribe the spoken audio verbatim. \
Output only the transcription text, nothing else. If the audio contains no \
intelligible speech, output nothing.";

const VOICE_ANSWER_SYSTEM: &str = "\
You are an expert programming assistant answering a spoken question. Use the \
problem context and conversation history when they are relevant. Reply with \
a JSON object only, inside a ```json fence: {\"short_answer\": string|null, \
\"code\": string, \"thoughts\": [string], \"time_complexity\": string, \
\"space_complexity\": string}. If no code is called for, use a short \
explanatory comment as the code value.";

// ═══════════════════════════════════════════════════════════
// Request builders
// ═══════════════════════════════════════════════════════════

/// Extraction over the primary captures.
pub fn extraction_request(media: Vec<MediaPart>, language: &str) -> InferenceRequest {
    InferenceRequest {
        system: EXTRACTION_SYSTEM.to_string(),
        user: format!(
            "Extract the problem from these images. Write the problem_statement in {language}."
        ),
        media,
    }
}

/// Structured solution over the extracted problem + conversation context.
pub fn solve_request(
    problem: &ProblemContext,
    conversation: &ConversationLog,
    language: &str,
) -> InferenceRequest {
    let mut user = format!(
        "Problem:\n{}\n\nAnswer in {language}.",
        problem.statement
    );
    if let Some(code) = problem.reference_code.as_deref() {
        user.push_str(&format!("\n\nStarter code:\n{code}"));
    }
    let context = conversation.context_string();
    if !context.is_empty() {
        user.push_str(&format!("\n\nConversation so far:\n{context}"));
    }
    InferenceRequest {
        system: SOLVE_SYSTEM.to_string(),
        user,
        media: Vec::new(),
    }
}

/// Debug analysis over primary + secondary captures and the current solution.
pub fn debug_request(
    problem: &ProblemContext,
    media: Vec<MediaPart>,
    conversation: &ConversationLog,
    language: &str,
) -> InferenceRequest {
    let mut user = format!(
        "Problem:\n{}\n\nAnswer in {language}.",
        problem.statement
    );
    if let Some(solution) = problem.solution.as_ref() {
        user.push_str(&format!("\n\nCurrent solution:\n{}", solution.code));
    }
    let context = conversation.context_string();
    if !context.is_empty() {
        user.push_str(&format!("\n\nConversation so far:\n{context}"));
    }
    InferenceRequest {
        system: DEBUG_SYSTEM.to_string(),
        user,
        media,
    }
}

/// Speech-to-text over a recorded question.
pub fn transcription_request(audio: MediaPart) -> InferenceRequest {
    InferenceRequest {
        system: TRANSCRIBE_SYSTEM.to_string(),
        user: "Transcribe this audio.".to_string(),
        media: vec![audio],
    }
}

/// Structured answer to a transcribed voice question.
pub fn voice_answer_request(
    transcription: &str,
    problem: Option<&ProblemContext>,
    conversation: &ConversationLog,
    language: &str,
) -> InferenceRequest {
    let mut user = format!("Question:\n{transcription}\n\nAnswer in {language}.");
    if let Some(problem) = problem {
        user.push_str(&format!("\n\nCurrent problem:\n{}", problem.statement));
        if let Some(solution) = problem.solution.as_ref() {
            user.push_str(&format!("\n\nCurrent solution:\n{}", solution.code));
        }
    }
    let context = conversation.context_string();
    if !context.is_empty() {
        user.push_str(&format!("\n\nConversation so far:\n{context}"));
    }
    InferenceRequest {
        system: VOICE_ANSWER_SYSTEM.to_string(),
        user,
        media: Vec::new(),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
