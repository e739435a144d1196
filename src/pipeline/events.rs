//! Structured stage-event emission.
//!
//! The orchestrator reports one event per executed stage through an
//! injected sink, decoupled from any particular output stream. The default
//! sink forwards to `tracing`.

use std::time::Instant;

/// How a stage concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage produced its primary result.
    Completed,
    /// The stage's deterministic fallback was used.
    Fallback,
    /// The stage was gated off (config gap or gating condition).
    Skipped,
    /// The stage replaced an upstream decision.
    Overridden,
}

/// One pipeline stage's execution record.
#[derive(Debug, Clone)]
pub struct StageEvent {
    pub stage: &'static str,
    pub duration_ms: u64,
    pub outcome: StageOutcome,
    /// Key/value metrics, e.g. ("confidence", "0.85").
    pub metrics: Vec<(&'static str, String)>,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: StageEvent);
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn emit(&self, event: StageEvent) {
        (**self).emit(event);
    }
}

/// Default sink: structured `tracing` records.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: StageEvent) {
        let metrics: Vec<String> = event
            .metrics
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        tracing::info!(
            stage = event.stage,
            duration_ms = event.duration_ms,
            outcome = ?event.outcome,
            metrics = %metrics.join(" "),
            "Pipeline stage finished"
        );
    }
}

/// Timer helper for building events around a stage body.
pub struct StageTimer {
    stage: &'static str,
    started: Instant,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub fn finish(self, outcome: StageOutcome, metrics: Vec<(&'static str, String)>) -> StageEvent {
        StageEvent {
            stage: self.stage,
            duration_ms: self.started.elapsed().as_millis() as u64,
            outcome,
            metrics,
        }
    }
}

/// Sink that records events in memory, for tests and diagnostics.
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<StageEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().expect("sink lock poisoned").clone()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.stage).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: StageEvent) {
        self.events.lock().expect("sink lock poisoned").push(event);
    }
}
