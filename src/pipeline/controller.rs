//! Pipeline controller — the session state machine.
//!
//! The controller is the single mutator of all session state (queues,
//! conversation memory, problem context, state machine position). It owns
//! one cancellation slot per action class (solve, debug) and enforces the
//! single-flight invariant: starting a new primary capture or a reset
//! cancels the outstanding flight before touching state, so a slow, stale
//! response can never overwrite a newer problem context.
//!
//! Locking discipline: `std::sync::Mutex` only, never held across an
//! await. Flows snapshot what they need, await the gateway, then re-check
//! flight currency before committing. Lock order is always flight slot →
//! session → queues/conversation.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use serde::Serialize;

use crate::capture::{CaptureError, CaptureQueues, CaptureSource, QueueSelector};
use crate::config::AppConfig;
use crate::conversation::{ConversationLog, ConversationTurn};
use crate::events::{EventBus, PipelineEvent};
use crate::gateway::{
    chain_from, FailureKind, GatewayError, InferenceGateway, MediaPart, RetryPolicy,
};
use crate::pipeline::session::{ProblemContext, Session, SessionState};
use crate::pipeline::{prompts, solution, PipelineError};

/// Distinct cancellation messages — never suggest retrying.
pub(crate) const SOLVE_CANCELED_MESSAGE: &str = "Solve canceled by user.";
pub(crate) const DEBUG_CANCELED_MESSAGE: &str = "Debug canceled by user.";

// ═══════════════════════════════════════════════════════════
// Flight slots
// ═══════════════════════════════════════════════════════════

/// One in-flight action class. `seq` distinguishes the current flight from
/// stale ones; a flight commits results only while its sequence number is
/// still current and its token has not been taken away.
#[derive(Default)]
pub(crate) struct FlightSlot {
    seq: u64,
    token: Option<CancellationToken>,
}

impl FlightSlot {
    /// Cancel any outstanding flight and open a new one.
    fn begin(&mut self) -> (u64, CancellationToken) {
        if let Some(previous) = self.token.take() {
            previous.cancel();
        }
        self.seq += 1;
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        (self.seq, token)
    }

    /// Cancel the outstanding flight, if any.
    fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    /// Close flight `seq` if it is still the current one.
    fn finish(&mut self, seq: u64) {
        if self.seq == seq {
            self.token = None;
        }
    }

    fn is_current(&self, seq: u64) -> bool {
        self.seq == seq && self.token.is_some()
    }
}

/// Ids currently held by the queues, for presentation queries.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub primary: Vec<Uuid>,
    pub secondary: Vec<Uuid>,
}

// ═══════════════════════════════════════════════════════════
// PipelineController
// ═══════════════════════════════════════════════════════════

pub struct PipelineController {
    pub(crate) config: AppConfig,
    pub(crate) bus: EventBus,
    pub(crate) gateway: InferenceGateway,
    pub(crate) source: Arc<dyn CaptureSource>,
    pub(crate) queues: Mutex<CaptureQueues>,
    pub(crate) conversation: Mutex<ConversationLog>,
    pub(crate) session: Mutex<Session>,
    pub(crate) solve_flight: Mutex<FlightSlot>,
    pub(crate) debug_flight: Mutex<FlightSlot>,
}

impl PipelineController {
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn crate::gateway::InferenceProvider>,
        source: Arc<dyn CaptureSource>,
    ) -> Self {
        let bus = EventBus::new();
        let gateway =
            InferenceGateway::new(provider, RetryPolicy::from_config(&config), bus.clone());
        let queues = CaptureQueues::new(source.clone(), config.secondary_capacity);
        let conversation = ConversationLog::new(config.conversation_window);
        Self {
            config,
            bus,
            gateway,
            source,
            queues: Mutex::new(queues),
            conversation: Mutex::new(conversation),
            session: Mutex::new(Session::default()),
            solve_flight: Mutex::new(FlightSlot::default()),
            debug_flight: Mutex::new(FlightSlot::default()),
        }
    }

    // ── Presentation queries ────────────────────────────────

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn gateway(&self) -> &InferenceGateway {
        &self.gateway
    }

    pub fn session_state(&self) -> SessionState {
        self.with_session(|s| s.state).unwrap_or_default()
    }

    pub fn has_debugged(&self) -> bool {
        self.with_session(|s| s.has_debugged).unwrap_or(false)
    }

    pub fn problem(&self) -> Option<ProblemContext> {
        self.with_session(|s| s.problem.clone()).flatten()
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.with_queues(|q| QueueSnapshot {
            primary: q.primary().iter().map(|i| i.id).collect(),
            secondary: q.secondary().map(|i| i.id).collect(),
        })
        .unwrap_or(QueueSnapshot {
            primary: Vec::new(),
            secondary: Vec::new(),
        })
    }

    /// Displayable encoding of a held capture.
    pub fn preview(&self, queue: QueueSelector, index: usize) -> Result<String, PipelineError> {
        let image = self
            .with_queues(|q| match queue {
                QueueSelector::Primary => q.primary().get(index).cloned(),
                QueueSelector::Secondary => q.secondary().nth(index).cloned(),
            })
            .flatten();
        match image {
            Some(image) => Ok(self.source.preview(&image)?),
            None => Err(CaptureError::IndexOutOfRange { queue, index }.into()),
        }
    }

    // ── Actions ─────────────────────────────────────────────

    /// Capture a fresh-problem image. Replaces the primary queue wholesale,
    /// empties the secondary queue, and forces the state machine back to
    /// `Queue`. Any outstanding flight is aborted first so its response
    /// cannot land on the new problem.
    pub fn capture_primary(&self) -> Result<(), PipelineError> {
        if let Ok(mut slot) = self.solve_flight.lock() {
            slot.cancel();
        }
        if let Ok(mut slot) = self.debug_flight.lock() {
            slot.cancel();
        }
        let image = self.source.capture_primary()?;
        tracing::info!(id = %image.id, "primary capture");
        self.with_queues(|q| q.replace_primary(image));
        self.with_session(|s| {
            if s.state != SessionState::Queue {
                tracing::debug!(from = %s.state, "primary capture forces state back to queue");
                s.state = SessionState::Queue;
            }
        });
        Ok(())
    }

    /// Capture a follow-up image for debugging.
    pub fn capture_secondary(&self) -> Result<(), PipelineError> {
        let image = self.source.capture_secondary()?;
        tracing::info!(id = %image.id, "secondary capture");
        self.with_queues(|q| q.push_secondary(image));
        Ok(())
    }

    /// Remove one held capture.
    pub fn delete(&self, queue: QueueSelector, index: usize) -> Result<(), PipelineError> {
        match self.with_queues(|q| q.delete(queue, index)) {
            Some(result) => result.map_err(Into::into),
            None => Ok(()),
        }
    }

    /// Advance the state machine: solve from `Queue`, debug from `Solved`.
    /// All outcomes are reported through the event bus.
    pub async fn process(&self) {
        let state = self.session_state();
        match state {
            SessionState::Queue => {
                if self.with_queues(|q| q.has_primary()).unwrap_or(false) {
                    self.run_solve().await;
                } else {
                    self.bus.emit(PipelineEvent::NoCaptures);
                }
            }
            SessionState::Solved => {
                if self.with_queues(|q| q.has_secondary()).unwrap_or(false) {
                    self.run_debug().await;
                } else {
                    self.bus.emit(PipelineEvent::NoCaptures);
                }
            }
            busy => {
                tracing::warn!(state = %busy, "process ignored; a sequence is already in flight");
            }
        }
    }

    /// Reset the session from any state: cancel both flights, destroy all
    /// captures, wipe conversation memory and problem context.
    pub fn reset(&self) {
        if let Ok(mut slot) = self.solve_flight.lock() {
            slot.cancel();
        }
        if let Ok(mut slot) = self.debug_flight.lock() {
            slot.cancel();
        }
        self.with_queues(|q| q.clear_all());
        self.with_conversation(|c| c.clear());
        self.with_session(|s| s.reset());
        tracing::info!("session reset");
        self.bus.emit(PipelineEvent::ResetView);
    }

    // ── Solve flow ──────────────────────────────────────────

    async fn run_solve(&self) {
        let Some((seq, token)) = self.begin_flight(&self.solve_flight) else {
            return;
        };

        let media = match self.primary_media() {
            Ok(media) if !media.is_empty() => media,
            Ok(_) => {
                self.finish_flight(&self.solve_flight, seq);
                self.bus.emit(PipelineEvent::NoCaptures);
                return;
            }
            Err(e) => {
                self.finish_flight(&self.solve_flight, seq);
                self.bus.emit(PipelineEvent::SolutionError {
                    message: format!("Could not read the captured image: {e}"),
                });
                return;
            }
        };

        self.with_session(|s| s.state = SessionState::Extracting);
        self.bus.emit(PipelineEvent::InitialStart);

        let chain = chain_from(&self.config.preferred_model);

        // Extraction
        let request = prompts::extraction_request(media, &self.config.response_language);
        let extracted = match self.gateway.execute(&request, &chain, &token).await {
            Ok(outcome) => solution::parse_extraction(&outcome.text),
            Err(err) => {
                self.fail_solve(seq, err);
                return;
            }
        };

        let problem = ProblemContext::new(extracted.statement, extracted.reference_code);
        let committed = self.commit_if_current(&self.solve_flight, seq, || {
            self.with_session(|s| {
                s.problem = Some(problem.clone());
                s.state = SessionState::Solving;
            });
            self.with_conversation(|c| c.append(ConversationTurn::user(&*problem.statement)));
        });
        if !committed {
            return;
        }
        self.bus.emit(PipelineEvent::ProblemExtracted {
            statement: problem.statement.clone(),
        });

        // Solving
        let request = match self.conversation.lock() {
            Ok(conversation) => {
                prompts::solve_request(&problem, &conversation, &self.config.response_language)
            }
            Err(_) => {
                self.fail_solve(seq, GatewayError::Canceled);
                return;
            }
        };
        match self.gateway.execute(&request, &chain, &token).await {
            Err(err) => self.fail_solve(seq, err),
            Ok(outcome) => {
                let payload = solution::parse_solution(&outcome.text);
                let committed = self.commit_if_current(&self.solve_flight, seq, || {
                    self.with_session(|s| {
                        if let Some(problem) = s.problem.as_mut() {
                            problem.solution = Some(payload.clone());
                        }
                        s.state = SessionState::Solved;
                    });
                    self.with_conversation(|c| {
                        c.append(ConversationTurn::assistant(payload.summary_line()));
                    });
                });
                if committed {
                    self.finish_flight(&self.solve_flight, seq);
                    self.emit_solution_success(&payload);
                }
            }
        }
    }

    // ── Debug flow ──────────────────────────────────────────

    async fn run_debug(&self) {
        let Some((seq, token)) = self.begin_flight(&self.debug_flight) else {
            return;
        };

        let Some(problem) = self.with_session(|s| s.problem.clone()).flatten() else {
            self.finish_flight(&self.debug_flight, seq);
            self.bus.emit(PipelineEvent::DebugError {
                message: "No solved problem to debug.".to_string(),
            });
            return;
        };

        let media = match self.all_media() {
            Ok(media) => media,
            Err(e) => {
                self.finish_flight(&self.debug_flight, seq);
                self.bus.emit(PipelineEvent::DebugError {
                    message: format!("Could not read the captured image: {e}"),
                });
                return;
            }
        };

        self.with_session(|s| s.state = SessionState::Debugging);
        self.bus.emit(PipelineEvent::DebugStart);

        let request = match self.conversation.lock() {
            Ok(conversation) => prompts::debug_request(
                &problem,
                media,
                &conversation,
                &self.config.response_language,
            ),
            Err(_) => {
                self.fail_debug(seq, GatewayError::Canceled);
                return;
            }
        };
        let chain = chain_from(&self.config.preferred_model);
        match self.gateway.execute(&request, &chain, &token).await {
            Err(err) => self.fail_debug(seq, err),
            Ok(outcome) => {
                let text = outcome.text;
                let committed = self.commit_if_current(&self.debug_flight, seq, || {
                    self.with_session(|s| {
                        s.has_debugged = true;
                        s.state = SessionState::Solved;
                    });
                    self.with_conversation(|c| {
                        c.append(ConversationTurn::assistant(&*text));
                    });
                });
                if committed {
                    self.finish_flight(&self.debug_flight, seq);
                    self.bus.emit(PipelineEvent::DebugSuccess { text });
                }
            }
        }
    }

    // ── Failure handling ────────────────────────────────────

    /// Terminal solve-flow failure: exactly one error event, state `Queue`.
    /// A stale flight (canceled by reset or a newer capture) reports the
    /// cancellation but leaves state alone — whoever canceled it has
    /// already put the session where it belongs.
    pub(crate) fn fail_solve(&self, seq: u64, err: GatewayError) {
        let message = match &err {
            GatewayError::Canceled => SOLVE_CANCELED_MESSAGE.to_string(),
            other => other.to_string(),
        };
        let rate_limited = err.kind() == FailureKind::RateLimited;
        self.close_failed_flight(&self.solve_flight, seq, SessionState::Queue);
        if rate_limited {
            self.bus.emit(PipelineEvent::OutOfQuota);
        }
        tracing::warn!(error = %err, "solve flow failed");
        self.bus.emit(PipelineEvent::SolutionError { message });
    }

    /// Terminal debug-flow failure: exactly one error event, state `Solved`
    /// (problem context retained).
    fn fail_debug(&self, seq: u64, err: GatewayError) {
        let message = match &err {
            GatewayError::Canceled => DEBUG_CANCELED_MESSAGE.to_string(),
            other => other.to_string(),
        };
        let rate_limited = err.kind() == FailureKind::RateLimited;
        self.close_failed_flight(&self.debug_flight, seq, SessionState::Solved);
        if rate_limited {
            self.bus.emit(PipelineEvent::OutOfQuota);
        }
        tracing::warn!(error = %err, "debug flow failed");
        self.bus.emit(PipelineEvent::DebugError { message });
    }

    pub(crate) fn close_failed_flight(
        &self,
        slot: &Mutex<FlightSlot>,
        seq: u64,
        failure_state: SessionState,
    ) {
        if let Ok(mut slot) = slot.lock() {
            if slot.is_current(seq) {
                self.with_session(|s| s.state = failure_state);
                slot.finish(seq);
            }
        }
    }

    // ── Flight plumbing ─────────────────────────────────────

    pub(crate) fn begin_flight(
        &self,
        slot: &Mutex<FlightSlot>,
    ) -> Option<(u64, CancellationToken)> {
        match slot.lock() {
            Ok(mut slot) => Some(slot.begin()),
            Err(_) => {
                tracing::error!("flight slot lock poisoned");
                None
            }
        }
    }

    pub(crate) fn finish_flight(&self, slot: &Mutex<FlightSlot>, seq: u64) {
        if let Ok(mut slot) = slot.lock() {
            slot.finish(seq);
        }
    }

    /// Run `commit` only while flight `seq` is still current. The slot
    /// lock is held across the commit so a concurrent reset cannot
    /// interleave between the check and the writes.
    pub(crate) fn commit_if_current(
        &self,
        slot: &Mutex<FlightSlot>,
        seq: u64,
        commit: impl FnOnce(),
    ) -> bool {
        let Ok(slot) = slot.lock() else {
            return false;
        };
        if !slot.is_current(seq) {
            tracing::debug!("stale flight result dropped");
            return false;
        }
        commit();
        true
    }

    // ── Shared-state helpers ────────────────────────────────

    pub(crate) fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        match self.session.lock() {
            Ok(mut session) => Some(f(&mut session)),
            Err(_) => {
                tracing::error!("session lock poisoned");
                None
            }
        }
    }

    pub(crate) fn with_queues<R>(&self, f: impl FnOnce(&mut CaptureQueues) -> R) -> Option<R> {
        match self.queues.lock() {
            Ok(mut queues) => Some(f(&mut queues)),
            Err(_) => {
                tracing::error!("queue lock poisoned");
                None
            }
        }
    }

    pub(crate) fn with_conversation<R>(
        &self,
        f: impl FnOnce(&mut ConversationLog) -> R,
    ) -> Option<R> {
        match self.conversation.lock() {
            Ok(mut conversation) => Some(f(&mut conversation)),
            Err(_) => {
                tracing::error!("conversation lock poisoned");
                None
            }
        }
    }

    pub(crate) fn emit_solution_success(&self, payload: &solution::SolutionPayload) {
        self.bus.emit(PipelineEvent::SolutionSuccess {
            short_answer: payload.short_answer.clone(),
            code: payload.code.clone(),
            thoughts: payload.thoughts.clone(),
            time_complexity: payload.time_complexity.clone(),
            space_complexity: payload.space_complexity.clone(),
        });
    }

    // ── Media assembly ──────────────────────────────────────

    fn primary_media(&self) -> Result<Vec<MediaPart>, CaptureError> {
        let images = self
            .with_queues(|q| q.primary().to_vec())
            .unwrap_or_default();
        read_media(images)
    }

    /// Primary + secondary, in capture order.
    fn all_media(&self) -> Result<Vec<MediaPart>, CaptureError> {
        let images = self
            .with_queues(|q| {
                let mut all = q.primary().to_vec();
                all.extend(q.secondary().cloned());
                all
            })
            .unwrap_or_default();
        read_media(images)
    }
}

fn read_media(images: Vec<crate::capture::CapturedImage>) -> Result<Vec<MediaPart>, CaptureError> {
    images
        .into_iter()
        .map(|image| {
            let bytes = std::fs::read(&image.path)?;
            Ok(MediaPart::from_bytes(image.mime_type(), &bytes))
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
