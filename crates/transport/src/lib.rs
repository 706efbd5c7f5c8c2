#![warn(clippy::unwrap_used)]

//! Record delivery to the collector.
//!
//! - [`ws`]: Persistent WebSocket transport with fixed-delay reconnect
//! - [`console`]: `CATCH` console line sink for socket-less environments

pub mod console;
pub mod ws;

pub use console::{parse_catch_line, CatchLine, ConsoleSink};
pub use ws::{ConnectionState, DeliveryPolicy, Transport, OUTBOUND_CAPACITY};
