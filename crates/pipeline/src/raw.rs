//! Raw browser events as a host binding delivers them, before normalization.

use std::fmt;

use capture_core::dom::NodeId;
use capture_core::types::EventClass;
use serde::{Deserialize, Serialize};

/// DOM event type a listener is registered for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DomEventType {
    Input,
    Click,
    KeyDown,
    KeyUp,
    MouseMove,
    MouseDown,
    MouseUp,
    Wheel,
}

impl DomEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomEventType::Input => "input",
            DomEventType::Click => "click",
            DomEventType::KeyDown => "keydown",
            DomEventType::KeyUp => "keyup",
            DomEventType::MouseMove => "mousemove",
            DomEventType::MouseDown => "mousedown",
            DomEventType::MouseUp => "mouseup",
            DomEventType::Wheel => "wheel",
        }
    }

    /// The DOM event that feeds records of `class`.
    pub fn for_class(class: EventClass) -> Self {
        match class {
            EventClass::Input => DomEventType::Input,
            EventClass::Click => DomEventType::Click,
            EventClass::Enter | EventClass::KeyDown => DomEventType::KeyDown,
            EventClass::KeyUp => DomEventType::KeyUp,
            EventClass::MouseMove => DomEventType::MouseMove,
            EventClass::MouseDown => DomEventType::MouseDown,
            EventClass::MouseUp => DomEventType::MouseUp,
            EventClass::Wheel => DomEventType::Wheel,
        }
    }
}

impl fmt::Display for DomEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fired DOM event. Coordinates are viewport (`clientX`/`clientY`) values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawEvent {
    /// `value` is absent when the binding leaves it to the element's current value.
    Input {
        target: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Click {
        target: NodeId,
        x: f64,
        y: f64,
    },
    KeyDown {
        key: String,
        code: String,
    },
    KeyUp {
        key: String,
        code: String,
    },
    MouseMove {
        x: f64,
        y: f64,
    },
    MouseDown {
        button: i16,
        x: f64,
        y: f64,
    },
    MouseUp {
        button: i16,
        x: f64,
        y: f64,
    },
    Wheel {
        delta_x: f64,
        delta_y: f64,
    },
}

impl RawEvent {
    pub fn dom_type(&self) -> DomEventType {
        match self {
            RawEvent::Input { .. } => DomEventType::Input,
            RawEvent::Click { .. } => DomEventType::Click,
            RawEvent::KeyDown { .. } => DomEventType::KeyDown,
            RawEvent::KeyUp { .. } => DomEventType::KeyUp,
            RawEvent::MouseMove { .. } => DomEventType::MouseMove,
            RawEvent::MouseDown { .. } => DomEventType::MouseDown,
            RawEvent::MouseUp { .. } => DomEventType::MouseUp,
            RawEvent::Wheel { .. } => DomEventType::Wheel,
        }
    }

    /// Element the event was fired on, for events that carry one.
    pub fn target(&self) -> Option<NodeId> {
        match self {
            RawEvent::Input { target, .. } | RawEvent::Click { target, .. } => Some(*target),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event_feed_format() {
        let raw: RawEvent =
            serde_json::from_str(r#"{"kind":"click","target":3,"x":100.0,"y":200.0}"#).unwrap();
        assert_eq!(
            raw,
            RawEvent::Click {
                target: NodeId(3),
                x: 100.0,
                y: 200.0
            }
        );
        assert_eq!(raw.dom_type(), DomEventType::Click);
        assert_eq!(raw.target(), Some(NodeId(3)));

        let raw: RawEvent =
            serde_json::from_str(r#"{"kind":"keydown","key":"Enter","code":"Enter"}"#).unwrap();
        assert_eq!(raw.dom_type().as_str(), "keydown");
        assert_eq!(raw.target(), None);
    }

    #[test]
    fn test_enter_and_keydown_share_a_dom_event() {
        assert_eq!(
            DomEventType::for_class(EventClass::Enter),
            DomEventType::for_class(EventClass::KeyDown)
        );
        assert_eq!(DomEventType::for_class(EventClass::Wheel), DomEventType::Wheel);
    }
}
