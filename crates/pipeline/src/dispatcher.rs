//! Capture dispatcher: owns the listener registrations for the tracked
//! interaction types and routes each fired event through normalization and
//! coalescing to the record sink.

use std::sync::Arc;

use capture_core::config::{CaptureSettings, WheelMode};
use capture_core::dom::Document;
use capture_core::error::CaptureError;
use capture_core::sink::RecordSink;
use capture_core::types::EventClass;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::coalescer::{AggregatedDelta, Coalescer};
use crate::normalizer::EventNormalizer;
use crate::raw::{DomEventType, RawEvent};
use crate::selector::SelectorResolver;

/// Where a listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerTarget {
    Window,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Capture,
    Bubble,
}

/// One registration per DOM event type. A `keydown` listener may feed both
/// the `KeyDown` and `Enter` classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub dom_type: DomEventType,
    pub target: ListenerTarget,
    pub phase: Phase,
    pub classes: Vec<EventClass>,
}

pub struct CaptureDispatcher {
    listeners: Vec<Listener>,
    normalizer: Arc<EventNormalizer>,
    coalescer: Option<Arc<Mutex<Coalescer>>>,
    /// Trailing-edge timer for the open wheel window. At most one is armed.
    wheel_timer: Mutex<Option<JoinHandle<()>>>,
    sink: Arc<dyn RecordSink>,
}

impl CaptureDispatcher {
    pub fn new(
        settings: &CaptureSettings,
        resolver: SelectorResolver,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let listeners = register_listeners(&settings.tracked);
        let coalescer = (settings.wheel_mode == WheelMode::Coalesced)
            .then(|| Arc::new(Mutex::new(Coalescer::new(settings.wheel_quiet_period()))));

        info!(
            listeners = listeners.len(),
            wheel_mode = ?settings.wheel_mode,
            delegated_selectors = resolver.has_capability(),
            "capture dispatcher ready"
        );

        Self {
            listeners,
            normalizer: Arc::new(EventNormalizer::new(resolver)),
            coalescer,
            wheel_timer: Mutex::new(None),
            sink,
        }
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    pub fn listener_for(&self, dom_type: DomEventType) -> Option<&Listener> {
        self.listeners.iter().find(|l| l.dom_type == dom_type)
    }

    /// Handle one fired DOM event. Events with no registered listener are ignored.
    pub fn dispatch(&self, document: &Document, raw: &RawEvent) {
        let Some(listener) = self.listener_for(raw.dom_type()) else {
            return;
        };
        for class in &listener.classes {
            self.dispatch_class(document, raw, *class);
        }
    }

    fn dispatch_class(&self, document: &Document, raw: &RawEvent, class: EventClass) {
        if let (EventClass::Wheel, Some(coalescer), RawEvent::Wheel { delta_x, delta_y }) =
            (class, &self.coalescer, raw)
        {
            self.offer_wheel(coalescer, (*delta_x, *delta_y));
            return;
        }

        // Stamped before the primary record so timestamps stay in send order.
        let scrolled = match class {
            EventClass::Input | EventClass::Click => self.normalizer.check_scrolled(document),
            _ => None,
        };

        match self.normalizer.normalize(document, raw, class) {
            Ok(Some(event)) => {
                if let Some(scrolled) = scrolled {
                    self.sink.send(&scrolled);
                }
                self.sink.send(&event);
            }
            Ok(None) => {}
            Err(err @ CaptureError::TargetNotFound { .. }) => {
                metrics::counter!("capture.failures").increment(1);
                debug!(class = %class, error = %err, "capture failed, reporting on fail channel");
                self.sink.fail(&self.normalizer.failure(raw, class, &err));
            }
            Err(err) => {
                warn!(class = %class, error = %err, "dropping event that could not be normalized");
            }
        }
    }

    fn offer_wheel(&self, coalescer: &Arc<Mutex<Coalescer>>, delta: (f64, f64)) {
        let (stale, quiet_period) = {
            let mut guard = coalescer.lock();
            (guard.offer(EventClass::Wheel, delta, Instant::now()), guard.quiet_period())
        };
        if let Some(stale) = stale {
            self.emit_aggregate(stale);
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // No timer available: fall back to emitting the burst as it stands.
            warn!("no tokio runtime for coalescing timer, flushing wheel window immediately");
            self.flush();
            return;
        };

        let coalescer = Arc::clone(coalescer);
        let normalizer = Arc::clone(&self.normalizer);
        let sink = Arc::clone(&self.sink);
        let timer = handle.spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let ready = coalescer.lock().poll_expired(Instant::now());
            for (_, delta) in ready {
                emit(&normalizer, sink.as_ref(), delta);
            }
        });
        if let Some(previous) = self.wheel_timer.lock().replace(timer) {
            previous.abort();
        }
    }

    fn emit_aggregate(&self, delta: AggregatedDelta) {
        emit(&self.normalizer, self.sink.as_ref(), delta);
    }

    /// Emit every pending coalesced window now (page teardown).
    pub fn flush(&self) {
        let Some(coalescer) = &self.coalescer else {
            return;
        };
        if let Some(timer) = self.wheel_timer.lock().take() {
            timer.abort();
        }
        let ready = coalescer.lock().flush_all();
        for (_, delta) in ready {
            self.emit_aggregate(delta);
        }
    }
}

fn emit(normalizer: &EventNormalizer, sink: &dyn RecordSink, delta: AggregatedDelta) {
    metrics::counter!("capture.coalesced_flushes").increment(1);
    debug!(
        delta_x = delta.delta_x,
        delta_y = delta.delta_y,
        folded = delta.count,
        "emitting coalesced wheel window"
    );
    sink.send(&normalizer.wheel_record(delta));
}

/// One capture-phase listener per DOM event type feeding a tracked class.
/// `input` and `click` attach to the window, everything else to the document.
fn register_listeners(tracked: &[EventClass]) -> Vec<Listener> {
    let mut listeners: Vec<Listener> = Vec::new();
    for class in EventClass::ALL {
        if !tracked.contains(&class) {
            continue;
        }
        let dom_type = DomEventType::for_class(class);
        match listeners.iter_mut().find(|l| l.dom_type == dom_type) {
            Some(existing) => existing.classes.push(class),
            None => listeners.push(Listener {
                dom_type,
                target: match dom_type {
                    DomEventType::Input | DomEventType::Click => ListenerTarget::Window,
                    _ => ListenerTarget::Document,
                },
                phase: Phase::Capture,
                classes: vec![class],
            }),
        }
    }
    listeners
}
