//! Interaction record types: the unit exchanged with the collector.
//!
//! A record's `data` schema is fixed by its class. [`EventData`] carries one
//! variant per class and [`InteractionEvent::class`] is derived from the
//! variant, so a record can never pair a class with a foreign schema.

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, CaptureResult};

/// Fixed set of tracked interaction classes. The variant names are the wire
/// strings the collector expects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventClass {
    Input,
    Click,
    Enter,
    KeyDown,
    KeyUp,
    MouseMove,
    MouseDown,
    MouseUp,
    Wheel,
}

impl EventClass {
    pub const ALL: [EventClass; 9] = [
        EventClass::Input,
        EventClass::Click,
        EventClass::Enter,
        EventClass::KeyDown,
        EventClass::KeyUp,
        EventClass::MouseMove,
        EventClass::MouseDown,
        EventClass::MouseUp,
        EventClass::Wheel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventClass::Input => "Input",
            EventClass::Click => "Click",
            EventClass::Enter => "Enter",
            EventClass::KeyDown => "KeyDown",
            EventClass::KeyUp => "KeyUp",
            EventClass::MouseMove => "MouseMove",
            EventClass::MouseDown => "MouseDown",
            EventClass::MouseUp => "MouseUp",
            EventClass::Wheel => "Wheel",
        }
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text input on an identified element, positioned by its layout offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputData {
    pub value: String,
    pub x: f64,
    pub y: f64,
}

/// Element box in viewport coordinates, plus the scroll offsets at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickData {
    pub x: f64,
    pub y: f64,
    pub selector: String,
    pub bounding_box: BoundingBox,
    /// Locator source produced by an automation engine, when one is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_locator: Option<String>,
}

/// Enter key press. `value` is the physical key code (always `"Enter"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterData {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyData {
    pub key: String,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerData {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButtonData {
    pub button: i16,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelData {
    pub delta_x: f64,
    pub delta_y: f64,
}

/// Class-specific record payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    Input(InputData),
    Click(ClickData),
    Enter(EnterData),
    KeyDown(KeyData),
    KeyUp(KeyData),
    MouseMove(PointerData),
    MouseDown(ButtonData),
    MouseUp(ButtonData),
    Wheel(WheelData),
}

impl EventData {
    pub fn class(&self) -> EventClass {
        match self {
            EventData::Input(_) => EventClass::Input,
            EventData::Click(_) => EventClass::Click,
            EventData::Enter(_) => EventClass::Enter,
            EventData::KeyDown(_) => EventClass::KeyDown,
            EventData::KeyUp(_) => EventClass::KeyUp,
            EventData::MouseMove(_) => EventClass::MouseMove,
            EventData::MouseDown(_) => EventClass::MouseDown,
            EventData::MouseUp(_) => EventClass::MouseUp,
            EventData::Wheel(_) => EventClass::Wheel,
        }
    }

    /// Parse a `data` object according to the schema of `class`.
    pub fn from_value(class: EventClass, value: serde_json::Value) -> CaptureResult<Self> {
        let data = match class {
            EventClass::Input => EventData::Input(serde_json::from_value(value)?),
            EventClass::Click => EventData::Click(serde_json::from_value(value)?),
            EventClass::Enter => EventData::Enter(serde_json::from_value(value)?),
            EventClass::KeyDown => EventData::KeyDown(serde_json::from_value(value)?),
            EventClass::KeyUp => EventData::KeyUp(serde_json::from_value(value)?),
            EventClass::MouseMove => EventData::MouseMove(serde_json::from_value(value)?),
            EventClass::MouseDown => EventData::MouseDown(serde_json::from_value(value)?),
            EventClass::MouseUp => EventData::MouseUp(serde_json::from_value(value)?),
            EventClass::Wheel => EventData::Wheel(serde_json::from_value(value)?),
        };
        Ok(data)
    }
}

/// A normalized interaction record.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionEvent {
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

/// Borrowed view serialized as one wire message: `{"type": ..., "data": {...}}`.
#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    #[serde(rename = "type")]
    pub event_type: EventClass,
    pub data: &'a EventData,
}

#[derive(Debug, Deserialize)]
struct OwnedWireMessage {
    #[serde(rename = "type")]
    event_type: EventClass,
    data: serde_json::Value,
}

impl InteractionEvent {
    pub fn new(data: EventData, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, data }
    }

    pub fn class(&self) -> EventClass {
        self.data.class()
    }

    pub fn wire_message(&self) -> WireMessage<'_> {
        WireMessage {
            event_type: self.class(),
            data: &self.data,
        }
    }

    /// Encode as the JSON text sent to the collector.
    pub fn to_wire(&self) -> CaptureResult<String> {
        Ok(serde_json::to_string(&self.wire_message())?)
    }

    /// Decode a collector-side wire message. The timestamp is the receive time.
    pub fn from_wire(text: &str) -> CaptureResult<Self> {
        let msg: OwnedWireMessage = serde_json::from_str(text)
            .map_err(|e| CaptureError::Wire(format!("malformed message: {e}")))?;
        let data = EventData::from_value(msg.event_type, msg.data)
            .map_err(|e| CaptureError::Wire(format!("bad {} payload: {e}", msg.event_type)))?;
        Ok(Self::new(data, Utc::now()))
    }
}

/// Hands out capture timestamps that never go backwards, even if the wall
/// clock is adjusted between events.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.observe(Utc::now())
    }

    /// Clamp `candidate` so it is not earlier than any previously returned instant.
    pub fn observe(&self, candidate: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let stamp = match *last {
            Some(prev) if prev > candidate => prev,
            _ => candidate,
        };
        *last = Some(stamp);
        stamp
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_input_wire_shape() {
        let event = InteractionEvent::new(
            EventData::Input(InputData {
                value: "hello".into(),
                x: 10.0,
                y: 20.0,
            }),
            Utc::now(),
        );
        let json: serde_json::Value = serde_json::from_str(&event.to_wire().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "Input", "data": {"value": "hello", "x": 10.0, "y": 20.0}})
        );
    }

    #[test]
    fn test_click_omits_missing_locator() {
        let event = InteractionEvent::new(
            EventData::Click(ClickData {
                x: 100.0,
                y: 200.0,
                selector: "#go".into(),
                bounding_box: BoundingBox {
                    left: 90.0,
                    top: 190.0,
                    right: 140.0,
                    bottom: 220.0,
                    width: 50.0,
                    height: 30.0,
                    scroll_x: 0.0,
                    scroll_y: 0.0,
                },
                python_locator: None,
            }),
            Utc::now(),
        );
        let json: serde_json::Value = serde_json::from_str(&event.to_wire().unwrap()).unwrap();
        assert_eq!(json["type"], "Click");
        assert_eq!(json["data"]["selector"], "#go");
        assert_eq!(json["data"]["bounding_box"]["width"], 50.0);
        assert!(json["data"].get("python_locator").is_none());
    }

    #[test]
    fn test_from_wire_uses_declared_schema() {
        let event =
            InteractionEvent::from_wire(r#"{"type":"KeyUp","data":{"key":"a","code":"KeyA"}}"#)
                .unwrap();
        assert_eq!(event.class(), EventClass::KeyUp);
        assert_eq!(
            event.data,
            EventData::KeyUp(KeyData {
                key: "a".into(),
                code: "KeyA".into()
            })
        );
    }

    #[test]
    fn test_from_wire_rejects_mismatched_payload() {
        let err = InteractionEvent::from_wire(r#"{"type":"Wheel","data":{"value":"x"}}"#)
            .unwrap_err();
        assert!(matches!(err, CaptureError::Wire(_)));

        let err = InteractionEvent::from_wire(r#"{"type":"Scroll","data":{}}"#).unwrap_err();
        assert!(matches!(err, CaptureError::Wire(_)));
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        let earlier = clock.observe(first - Duration::seconds(30));
        assert_eq!(earlier, first);
        let later = clock.observe(first + Duration::seconds(1));
        assert!(later > first);
    }
}
