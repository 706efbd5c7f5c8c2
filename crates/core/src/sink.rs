//! Record sinks: where normalized interaction records go.
//!
//! Pipeline components accept an `Arc<dyn RecordSink>`. The WebSocket
//! transport and the console `CATCH` sink implement it in `capture-transport`;
//! the sinks here serve tests and hosts that discard records.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::types::{EventClass, InteractionEvent};

/// A capture that could not produce a record, reported on the Fail channel.
/// Carries the data of the event that failed, shaped like a wire message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureFailure {
    #[serde(rename = "type")]
    pub event_type: EventClass,
    pub data: serde_json::Value,
    #[serde(skip)]
    pub reason: String,
}

pub trait RecordSink: Send + Sync {
    /// Deliver one record. Must not block and must not fail loudly.
    fn send(&self, event: &InteractionEvent);

    /// Report a capture failure. Never reaches the normal record stream.
    fn fail(&self, failure: &CaptureFailure);
}

/// Sink that discards everything.
pub struct NoOpSink;

impl RecordSink for NoOpSink {
    fn send(&self, _event: &InteractionEvent) {}

    fn fail(&self, _failure: &CaptureFailure) {}
}

/// In-memory sink that captures records and failures for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<InteractionEvent>>,
    failures: Mutex<Vec<CaptureFailure>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<InteractionEvent> {
        self.events.lock().clone()
    }

    pub fn failures(&self) -> Vec<CaptureFailure> {
        self.failures.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_class(&self, class: EventClass) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.class() == class)
            .count()
    }

    pub fn classes(&self) -> Vec<EventClass> {
        self.events.lock().iter().map(|e| e.class()).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.failures.lock().clear();
    }
}

impl RecordSink for CaptureSink {
    fn send(&self, event: &InteractionEvent) {
        self.events.lock().push(event.clone());
    }

    fn fail(&self, failure: &CaptureFailure) {
        self.failures.lock().push(failure.clone());
    }
}

/// Convenience: a sink for hosts that don't forward records anywhere.
pub fn noop_sink() -> Arc<dyn RecordSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
