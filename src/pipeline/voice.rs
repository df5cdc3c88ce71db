//! Voice turn adapter — spoken questions enter the pipeline without
//! captures.
//!
//! A voice turn is a solve-class action: it shares the solve cancellation
//! slot (an outstanding solve is aborted first), reuses the gateway and
//! conversation memory, and drives the session straight to `Solved`,
//! bypassing `Extracting`. The presentation layer sees the same
//! `ProblemExtracted`/`SolutionSuccess` events the screenshot path emits.

use crate::conversation::ConversationTurn;
use crate::events::PipelineEvent;
use crate::gateway::{chain_from, GatewayError, MediaPart};
use crate::pipeline::controller::PipelineController;
use crate::pipeline::session::{ProblemContext, SessionState};
use crate::pipeline::{prompts, solution};

pub(crate) const COULD_NOT_TRANSCRIBE_MESSAGE: &str =
    "Could not transcribe the question. Speak clearly and try again.";

/// Raw recorded audio handed over by the presentation layer.
#[derive(Debug, Clone)]
pub struct VoiceAudio {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl VoiceAudio {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    fn into_media_part(self) -> MediaPart {
        MediaPart::from_bytes(self.mime_type, &self.data)
    }
}

impl PipelineController {
    /// Submit a spoken question.
    ///
    /// (a) transcribe over the fallback chain, (b) append the
    /// transcription as a user turn, (c) generate a structured answer with
    /// problem context + conversation context, (d) synthesize the voice
    /// question as the problem statement and land in `Solved`.
    pub async fn submit_voice(&self, audio: VoiceAudio) {
        let Some((seq, token)) = self.begin_flight(&self.solve_flight) else {
            return;
        };

        self.with_session(|s| s.state = SessionState::Solving);
        self.bus.emit(PipelineEvent::InitialStart);

        let chain = chain_from(&self.config.preferred_model);

        // (a) Transcription
        let request = prompts::transcription_request(audio.into_media_part());
        let transcription = match self.gateway.execute(&request, &chain, &token).await {
            Ok(outcome) => outcome.text.trim().to_string(),
            Err(err @ GatewayError::Canceled) => {
                self.fail_solve(seq, err);
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "voice transcription failed across the chain");
                self.fail_transcription(seq);
                return;
            }
        };
        if transcription.is_empty() {
            tracing::warn!("voice transcription came back empty");
            self.fail_transcription(seq);
            return;
        }

        // (b) User turn
        let committed = self.commit_if_current(&self.solve_flight, seq, || {
            self.with_conversation(|c| c.append(ConversationTurn::user(&*transcription)));
        });
        if !committed {
            return;
        }

        // (c) Structured answer
        let problem_before = self.with_session(|s| s.problem.clone()).flatten();
        let request = match self.conversation.lock() {
            Ok(conversation) => prompts::voice_answer_request(
                &transcription,
                problem_before.as_ref(),
                &conversation,
                &self.config.response_language,
            ),
            Err(_) => {
                self.fail_solve(seq, GatewayError::Canceled);
                return;
            }
        };
        match self.gateway.execute(&request, &chain, &token).await {
            Err(err) => self.fail_solve(seq, err),
            Ok(outcome) => {
                let payload = solution::parse_solution(&outcome.text);

                // (d) The voice question becomes the problem statement;
                // Extracting is bypassed entirely.
                let committed = self.commit_if_current(&self.solve_flight, seq, || {
                    self.with_session(|s| {
                        let mut problem = ProblemContext::new(transcription.clone(), None);
                        problem.solution = Some(payload.clone());
                        s.problem = Some(problem);
                        s.state = SessionState::Solved;
                    });
                    self.with_conversation(|c| {
                        c.append(ConversationTurn::assistant(payload.summary_line()));
                    });
                });
                if committed {
                    self.finish_flight(&self.solve_flight, seq);
                    self.bus.emit(PipelineEvent::ProblemExtracted {
                        statement: transcription,
                    });
                    self.emit_solution_success(&payload);
                }
            }
        }
    }

    /// Transcription-specific terminal failure: fixed message, solve-class
    /// failure state.
    fn fail_transcription(&self, seq: u64) {
        self.close_failed_flight(&self.solve_flight, seq, SessionState::Queue);
        self.bus.emit(PipelineEvent::SolutionError {
            message: COULD_NOT_TRANSCRIBE_MESSAGE.to_string(),
        });
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, CaptureSource, CapturedImage};
    use crate::config::AppConfig;
    use crate::gateway::{FailureKind, ScriptStep, ScriptedProvider};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct NoCaptures;

    impl CaptureSource for NoCaptures {
        fn capture_primary(&self) -> Result<CapturedImage, CaptureError> {
            Err(CaptureError::CaptureFailed("not available".into()))
        }
        fn capture_secondary(&self) -> Result<CapturedImage, CaptureError> {
            Err(CaptureError::CaptureFailed("not available".into()))
        }
        fn delete(&self, _: &CapturedImage) -> Result<(), CaptureError> {
            Ok(())
        }
    }

    fn controller_with(
        script: Vec<ScriptStep>,
    ) -> (
        Arc<PipelineController>,
        UnboundedReceiver<PipelineEvent>,
    ) {
        let config = AppConfig {
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(1),
            ..AppConfig::default()
        };
        let controller = Arc::new(PipelineController::new(
            config,
            Arc::new(ScriptedProvider::new(script)),
            Arc::new(NoCaptures),
        ));
        let (_sub, rx) = controller.events().watch();
        (controller, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn audio() -> VoiceAudio {
        VoiceAudio::new("audio/wav", b"riff-wave-bytes".to_vec())
    }

    fn answer_ok() -> ScriptStep {
        ScriptStep::Succeed(
            r#"{"short_answer": "Recurse on children.", "code": "fn invert() {}", "thoughts": ["swap left and right"], "time_complexity": "O(n)", "space_complexity": "O(h)"}"#
                .to_string(),
        )
    }

    #[tokio::test]
    async fn voice_turn_lands_in_solved_with_question_as_statement() {
        let (controller, mut rx) = controller_with(vec![
            ScriptStep::Succeed("How do I invert a binary tree?".into()),
            answer_ok(),
        ]);

        controller.submit_voice(audio()).await;

        let events = drain(&mut rx);
        assert_eq!(events[0], PipelineEvent::InitialStart);
        assert!(events.contains(&PipelineEvent::ProblemExtracted {
            statement: "How do I invert a binary tree?".into()
        }));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::SolutionSuccess { .. })));

        assert_eq!(controller.session_state(), SessionState::Solved);
        let problem = controller.problem().unwrap();
        assert_eq!(problem.statement, "How do I invert a binary tree?");
        assert_eq!(problem.reference_code, None);
        assert!(!problem.solution.unwrap().degraded);

        // user transcription turn + assistant summary turn
        assert_eq!(controller.with_conversation(|c| c.len()).unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_transcription_fails_with_fixed_message() {
        let (controller, mut rx) =
            controller_with(vec![ScriptStep::Succeed("   ".into())]);

        controller.submit_voice(audio()).await;

        let events = drain(&mut rx);
        let error = events.iter().find_map(|e| match e {
            PipelineEvent::SolutionError { message } => Some(message.clone()),
            _ => None,
        });
        assert_eq!(error.as_deref(), Some(COULD_NOT_TRANSCRIBE_MESSAGE));
        assert_eq!(controller.session_state(), SessionState::Queue);
        assert!(controller.with_conversation(|c| c.is_empty()).unwrap());
    }

    #[tokio::test]
    async fn failed_transcription_across_chain_fails_with_fixed_message() {
        // Default chain has 3 candidates; every one answers garbage
        let (controller, mut rx) = controller_with(vec![
            ScriptStep::Fail(FailureKind::MalformedResponse, "no text".into()),
            ScriptStep::Fail(FailureKind::MalformedResponse, "no text".into()),
            ScriptStep::Fail(FailureKind::MalformedResponse, "no text".into()),
        ]);

        controller.submit_voice(audio()).await;

        let events = drain(&mut rx);
        let error = events.iter().find_map(|e| match e {
            PipelineEvent::SolutionError { message } => Some(message.clone()),
            _ => None,
        });
        assert_eq!(error.as_deref(), Some(COULD_NOT_TRANSCRIBE_MESSAGE));
        assert_eq!(controller.session_state(), SessionState::Queue);
    }

    #[tokio::test]
    async fn voice_answer_failure_returns_to_queue() {
        let (controller, mut rx) = controller_with(vec![
            ScriptStep::Succeed("what is memoization?".into()),
            ScriptStep::Fail(FailureKind::Unknown, "boom".into()),
            ScriptStep::Fail(FailureKind::Unknown, "boom".into()),
            ScriptStep::Fail(FailureKind::Unknown, "boom".into()),
        ]);

        controller.submit_voice(audio()).await;

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::SolutionError { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, PipelineEvent::SolutionSuccess { .. })));
        assert_eq!(controller.session_state(), SessionState::Queue);
        // The user turn stays in memory — the question was understood
        assert_eq!(controller.with_conversation(|c| c.len()).unwrap(), 1);
    }

    #[tokio::test]
    async fn degraded_voice_answer_still_solves() {
        let (controller, mut rx) = controller_with(vec![
            ScriptStep::Succeed("explain big-O".into()),
            ScriptStep::Succeed("Big-O bounds growth rates.".into()),
        ]);

        controller.submit_voice(audio()).await;

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::SolutionSuccess { .. })));
        assert_eq!(controller.session_state(), SessionState::Solved);
        assert!(controller.problem().unwrap().solution.unwrap().degraded);
    }
}
