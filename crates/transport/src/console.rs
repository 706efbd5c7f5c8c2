//! Console transmission: the `CATCH` line protocol for environments where
//! the collector reads the page's console instead of a socket.
//!
//! Each line is `CATCH <flag> <json>`. The flag is a class name (payload: the
//! record's `data`), `FAIL` (payload: `{"type", "data"}` of the failed
//! capture) or `DEBUG` (free-form payload).

use std::io::{self, Stdout, Write};

use capture_core::error::{CaptureError, CaptureResult};
use capture_core::sink::{CaptureFailure, RecordSink};
use capture_core::types::{EventClass, EventData, InteractionEvent};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

pub const CATCH_FLAG: &str = "CATCH";
pub const FAIL_FLAG: &str = "FAIL";
pub const DEBUG_FLAG: &str = "DEBUG";

pub struct ConsoleSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    /// Emit a `DEBUG` line.
    pub fn debug(&self, payload: &Value) {
        self.write_line(DEBUG_FLAG, payload);
    }

    fn write_line<T: serde::Serialize + ?Sized>(&self, flag: &str, payload: &T) {
        let json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                warn!(flag, error = %e, "console payload could not be encoded");
                return;
            }
        };
        let mut writer = self.writer.lock();
        let result = writeln!(writer, "{CATCH_FLAG} {flag} {json}").and_then(|_| writer.flush());
        if let Err(e) = result {
            warn!(flag, error = %e, "console write failed, line dropped");
        }
    }
}

impl<W: Write + Send> RecordSink for ConsoleSink<W> {
    fn send(&self, event: &InteractionEvent) {
        self.write_line(event.class().as_str(), &event.data);
    }

    fn fail(&self, failure: &CaptureFailure) {
        self.write_line(FAIL_FLAG, failure);
    }
}

/// A parsed console line, as a collector sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum CatchLine {
    Record(EventData),
    Fail { event_type: EventClass, data: Value },
    Debug(Value),
}

/// Parse a console line. Lines without the `CATCH` prefix yield `Ok(None)`.
pub fn parse_catch_line(line: &str) -> CaptureResult<Option<CatchLine>> {
    let Some(rest) = line.strip_prefix(CATCH_FLAG).and_then(|r| r.strip_prefix(' ')) else {
        return Ok(None);
    };
    let (flag, payload) = rest
        .split_once(' ')
        .ok_or_else(|| CaptureError::Wire(format!("CATCH line without payload: {line:?}")))?;
    let payload: Value = serde_json::from_str(payload)?;

    let parsed = match flag {
        DEBUG_FLAG => CatchLine::Debug(payload),
        FAIL_FLAG => {
            let event_type: EventClass = serde_json::from_value(payload["type"].clone())
                .map_err(|e| CaptureError::Wire(format!("FAIL line without class: {e}")))?;
            CatchLine::Fail {
                event_type,
                data: payload["data"].clone(),
            }
        }
        class => {
            let class: EventClass = serde_json::from_value(Value::String(class.to_string()))
                .map_err(|_| CaptureError::Wire(format!("unknown CATCH flag {class:?}")))?;
            CatchLine::Record(EventData::from_value(class, payload)?)
        }
    };
    Ok(Some(parsed))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use capture_core::types::{InputData, WheelData};
    use chrono::Utc;

    fn lines(sink: ConsoleSink<Vec<u8>>) -> Vec<String> {
        String::from_utf8(sink.into_inner())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_record_line() {
        let sink = ConsoleSink::new(Vec::new());
        sink.send(&InteractionEvent::new(
            EventData::Wheel(WheelData {
                delta_x: 5.0,
                delta_y: 0.0,
            }),
            Utc::now(),
        ));
        assert_eq!(
            lines(sink),
            vec![r#"CATCH Wheel {"delta_x":5.0,"delta_y":0.0}"#.to_string()]
        );
    }

    #[test]
    fn test_fail_line_carries_event_data() {
        let sink = ConsoleSink::new(Vec::new());
        sink.fail(&CaptureFailure {
            event_type: EventClass::Input,
            data: serde_json::json!({"value": "hello"}),
            reason: "no element".into(),
        });
        sink.debug(&serde_json::json!({"note": "loaded"}));

        let out = lines(sink);
        assert_eq!(out[0], r#"CATCH FAIL {"type":"Input","data":{"value":"hello"}}"#);
        assert_eq!(out[1], r#"CATCH DEBUG {"note":"loaded"}"#);
    }

    #[test]
    fn test_parse_lines_back() {
        let sink = ConsoleSink::new(Vec::new());
        let input = EventData::Input(InputData {
            value: "a b".into(),
            x: 1.0,
            y: 2.0,
        });
        sink.send(&InteractionEvent::new(input.clone(), Utc::now()));
        sink.fail(&CaptureFailure {
            event_type: EventClass::Input,
            data: serde_json::json!({"value": "z"}),
            reason: String::new(),
        });
        let out = lines(sink);

        assert_eq!(
            parse_catch_line(&out[0]).unwrap(),
            Some(CatchLine::Record(input))
        );
        assert_eq!(
            parse_catch_line(&out[1]).unwrap(),
            Some(CatchLine::Fail {
                event_type: EventClass::Input,
                data: serde_json::json!({"value": "z"})
            })
        );
    }

    #[test]
    fn test_parse_ignores_other_console_output() {
        assert_eq!(parse_catch_line("page loaded").unwrap(), None);
        assert_eq!(parse_catch_line("CATCHER Wheel {}").unwrap(), None);
        assert!(parse_catch_line("CATCH Bogus {}").is_err());
        assert!(parse_catch_line("CATCH Wheel").is_err());
    }
}
