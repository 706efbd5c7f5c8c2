#![warn(clippy::unwrap_used)]

//! Shared building blocks for the interaction capture pipeline: record
//! types, the page model, configuration, errors, and record sinks.

pub mod config;
pub mod dom;
pub mod error;
pub mod sink;
pub mod types;

pub use config::{CaptureConfig, CaptureSettings, TransportConfig};
pub use dom::{Document, NodeId};
pub use error::{CaptureError, CaptureResult};
pub use sink::{CaptureFailure, RecordSink};
pub use types::{EventClass, EventData, InteractionEvent};
