//! Presentation event channel — fixed vocabulary, typed publish/subscribe.
//!
//! The pipeline controller never calls back into presentation-layer
//! closures directly; it publishes `PipelineEvent` values on an `EventBus`.
//! `subscribe` hands back an explicit `Subscription` handle; detaching is
//! an explicit `unsubscribe()` call, not a side effect of dropping the
//! handle. `watch()` is a channel-backed convenience for async consumers
//! (and tests).
//!
//! Payloads are serde-serializable so a UI shell can forward them to its
//! renderer verbatim.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde::Serialize;
use tokio::sync::mpsc;

// ═══════════════════════════════════════════════════════════
// Event vocabulary
// ═══════════════════════════════════════════════════════════

/// Everything the presentation layer can observe from the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A solve flow started; show the loading surface.
    InitialStart,
    /// Problem statement extracted from the primary captures.
    ProblemExtracted { statement: String },
    /// Structured solution ready.
    SolutionSuccess {
        short_answer: Option<String>,
        code: String,
        thoughts: Vec<String>,
        time_complexity: String,
        space_complexity: String,
    },
    /// Solve flow failed; `message` is already user-facing.
    SolutionError { message: String },
    /// `process` was invoked with nothing to work on.
    NoCaptures,
    /// A debug flow started.
    DebugStart,
    /// Debug analysis ready.
    DebugSuccess { text: String },
    /// Debug flow failed; `message` is already user-facing.
    DebugError { message: String },
    /// Session was reset; clear everything.
    ResetView,
    /// A gateway call succeeded on this model.
    ModelUsed { model: String },
    /// Every candidate model was rate-limited.
    OutOfQuota,
}

impl PipelineEvent {
    /// Stable label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitialStart => "initial_start",
            Self::ProblemExtracted { .. } => "problem_extracted",
            Self::SolutionSuccess { .. } => "solution_success",
            Self::SolutionError { .. } => "solution_error",
            Self::NoCaptures => "no_captures",
            Self::DebugStart => "debug_start",
            Self::DebugSuccess { .. } => "debug_success",
            Self::DebugError { .. } => "debug_error",
            Self::ResetView => "reset_view",
            Self::ModelUsed { .. } => "model_used",
            Self::OutOfQuota => "out_of_quota",
        }
    }
}

// ═══════════════════════════════════════════════════════════
// EventBus
// ═══════════════════════════════════════════════════════════

type SinkFn = dyn Fn(&PipelineEvent) + Send + Sync;

/// Cheaply clonable publish/subscribe bus.
///
/// Sinks run inline on the emitting task and must not block. A sink must
/// not subscribe or unsubscribe from inside its own callback.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    sinks: RwLock<HashMap<u64, Arc<SinkFn>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a sink. The returned handle is the only way to detach it.
    pub fn subscribe<F>(&self, sink: F) -> Subscription
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut sinks) = self.inner.sinks.write() {
            sinks.insert(id, Arc::new(sink));
        }
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Channel-backed subscription: every emitted event is cloned into an
    /// unbounded receiver. Dropping the receiver is harmless; the sink is
    /// detached via the returned handle as usual.
    pub fn watch(&self) -> (Subscription, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// Publish one event to every attached sink.
    pub fn emit(&self, event: PipelineEvent) {
        tracing::debug!(event = event.kind(), "pipeline event");
        let sinks: Vec<Arc<SinkFn>> = match self.inner.sinks.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => return,
        };
        for sink in sinks {
            sink(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.sinks.read().map(|m| m.len()).unwrap_or(0)
    }
}

/// Handle returned by `subscribe`. Dropping it does NOT detach the sink;
/// call `unsubscribe()` explicitly.
pub struct Subscription {
    id: u64,
    inner: Weak<BusInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut sinks) = inner.sinks.write() {
                sinks.remove(&self.id);
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
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscribe_receives_events() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let _sub = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(PipelineEvent::InitialStart);
        bus.emit(PipelineEvent::NoCaptures);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_detaches_sink() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let sub = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(PipelineEvent::ResetView);
        sub.unsubscribe();
        bus.emit(PipelineEvent::ResetView);

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn dropping_handle_keeps_sink_attached() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        {
            let _sub = bus.subscribe(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.emit(PipelineEvent::OutOfQuota);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn watch_delivers_clones_in_order() {
        let bus = EventBus::new();
        let (_sub, mut rx) = bus.watch();

        bus.emit(PipelineEvent::InitialStart);
        bus.emit(PipelineEvent::ProblemExtracted {
            statement: "two sum".into(),
        });

        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::InitialStart);
        assert_eq!(
            rx.try_recv().unwrap(),
            PipelineEvent::ProblemExtracted {
                statement: "two sum".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn clones_share_subscribers() {
        let bus = EventBus::new();
        let twin = bus.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let _sub = twin.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(PipelineEvent::DebugStart);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_string(&PipelineEvent::ModelUsed {
            model: "gemini-2.5-flash".into(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"model_used\""));
        assert!(json.contains("gemini-2.5-flash"));

        let json = serde_json::to_string(&PipelineEvent::SolutionSuccess {
            short_answer: None,
            code: "fn main() {}".into(),
            thoughts: vec!["t".into()],
            time_complexity: "O(n)".into(),
            space_complexity: "O(1)".into(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"solution_success\""));
        assert!(json.contains("time_complexity"));
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(PipelineEvent::InitialStart.kind(), "initial_start");
        assert_eq!(PipelineEvent::OutOfQuota.kind(), "out_of_quota");
        assert_eq!(
            PipelineEvent::SolutionError { message: "x".into() }.kind(),
            "solution_error"
        );
    }
}
