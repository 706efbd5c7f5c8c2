//! Event normalization: raw DOM events into uniform interaction records.

use std::sync::Arc;

use capture_core::dom::{Document, NodeId};
use capture_core::error::{CaptureError, CaptureResult};
use capture_core::sink::CaptureFailure;
use capture_core::types::{
    BoundingBox, ButtonData, ClickData, EnterData, EventClass, EventData, InputData,
    InteractionEvent, KeyData, MonotonicClock, PointerData, WheelData,
};
use tracing::trace;

use crate::coalescer::AggregatedDelta;
use crate::raw::RawEvent;
use crate::selector::SelectorResolver;

const ENTER_CODE: &str = "Enter";
const LOCATOR_LANGUAGE: &str = "python";

pub struct EventNormalizer {
    resolver: SelectorResolver,
    clock: Arc<MonotonicClock>,
}

impl EventNormalizer {
    pub fn new(resolver: SelectorResolver) -> Self {
        Self {
            resolver,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    pub fn resolver(&self) -> &SelectorResolver {
        &self.resolver
    }

    fn record(&self, data: EventData) -> InteractionEvent {
        InteractionEvent::new(data, self.clock.now())
    }

    /// Normalize `raw` into a record of `class`.
    ///
    /// `Ok(None)` means the event produces nothing for this class: an Enter
    /// listener seeing another key, or a raw event of a different kind.
    pub fn normalize(
        &self,
        document: &Document,
        raw: &RawEvent,
        class: EventClass,
    ) -> CaptureResult<Option<InteractionEvent>> {
        let data = match (class, raw) {
            (EventClass::Input, RawEvent::Input { target, value }) => {
                EventData::Input(self.input_data(document, *target, value.as_deref())?)
            }
            (EventClass::Click, RawEvent::Click { target, x, y }) => {
                EventData::Click(self.click_data(document, *target, *x, *y))
            }
            (EventClass::Enter, RawEvent::KeyDown { code, .. }) => {
                if code != ENTER_CODE {
                    return Ok(None);
                }
                EventData::Enter(EnterData {
                    value: code.clone(),
                })
            }
            (EventClass::KeyDown, RawEvent::KeyDown { key, code }) => EventData::KeyDown(KeyData {
                key: key.clone(),
                code: code.clone(),
            }),
            (EventClass::KeyUp, RawEvent::KeyUp { key, code }) => EventData::KeyUp(KeyData {
                key: key.clone(),
                code: code.clone(),
            }),
            (EventClass::MouseMove, RawEvent::MouseMove { x, y }) => {
                EventData::MouseMove(PointerData { x: *x, y: *y })
            }
            (EventClass::MouseDown, RawEvent::MouseDown { button, x, y }) => {
                EventData::MouseDown(ButtonData {
                    button: *button,
                    x: *x,
                    y: *y,
                })
            }
            (EventClass::MouseUp, RawEvent::MouseUp { button, x, y }) => {
                EventData::MouseUp(ButtonData {
                    button: *button,
                    x: *x,
                    y: *y,
                })
            }
            (EventClass::Wheel, RawEvent::Wheel { delta_x, delta_y }) => {
                EventData::Wheel(WheelData {
                    delta_x: *delta_x,
                    delta_y: *delta_y,
                })
            }
            (class, raw) => {
                trace!(class = %class, dom_type = %raw.dom_type(), "raw event does not feed class");
                return Ok(None);
            }
        };
        Ok(Some(self.record(data)))
    }

    fn input_data(
        &self,
        document: &Document,
        target: NodeId,
        value: Option<&str>,
    ) -> CaptureResult<InputData> {
        let element_id = document.id(target).unwrap_or_default();
        let element = document
            .get_element_by_id(element_id)
            .ok_or_else(|| CaptureError::TargetNotFound {
                element_id: element_id.to_string(),
            })?;
        let (x, y) = document.offset(element);
        let value = value.or_else(|| document.value(element)).unwrap_or_default();
        Ok(InputData {
            value: value.to_string(),
            x,
            y,
        })
    }

    fn click_data(&self, document: &Document, target: NodeId, x: f64, y: f64) -> ClickData {
        let rect = document.bounding_client_rect(target);
        let (scroll_x, scroll_y) = document.scroll();
        ClickData {
            x,
            y,
            selector: self.resolver.resolve(document, target),
            python_locator: self.resolver.locator(document, target, LOCATOR_LANGUAGE),
            bounding_box: BoundingBox {
                left: rect.left,
                top: rect.top,
                right: rect.right(),
                bottom: rect.bottom(),
                width: rect.width,
                height: rect.height,
                scroll_x,
                scroll_y,
            },
        }
    }

    /// A Wheel record carrying the window scroll offsets, when the page is scrolled.
    pub fn check_scrolled(&self, document: &Document) -> Option<InteractionEvent> {
        let (scroll_x, scroll_y) = document.scroll();
        if scroll_x == 0.0 && scroll_y == 0.0 {
            return None;
        }
        Some(self.record(EventData::Wheel(WheelData {
            delta_x: scroll_x,
            delta_y: scroll_y,
        })))
    }

    /// Wheel record for a coalesced window.
    pub fn wheel_record(&self, delta: AggregatedDelta) -> InteractionEvent {
        self.record(EventData::Wheel(WheelData {
            delta_x: delta.delta_x,
            delta_y: delta.delta_y,
        }))
    }

    /// Fail-channel report for a raw event that could not be captured.
    pub fn failure(&self, raw: &RawEvent, class: EventClass, err: &CaptureError) -> CaptureFailure {
        let data = match raw {
            RawEvent::Input { value, .. } => {
                serde_json::json!({ "value": value.as_deref().unwrap_or_default() })
            }
            other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
        };
        CaptureFailure {
            event_type: class,
            data,
            reason: err.to_string(),
        }
    }
}
