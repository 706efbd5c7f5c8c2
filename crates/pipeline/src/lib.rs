#![warn(clippy::unwrap_used)]

//! Interaction capture pipeline: turns fired DOM events into interaction
//! records and hands them to a record sink.
//!
//! # Modules
//!
//! - [`raw`]: Raw browser events as delivered by the host binding
//! - [`selector`]: Stable element selectors, with an optional delegated engine
//! - [`normalizer`]: Per-class shaping of raw events into records
//! - [`coalescer`]: Trailing-edge debounce for wheel bursts
//! - [`dispatcher`]: Listener registrations and event routing

pub mod coalescer;
pub mod dispatcher;
pub mod normalizer;
pub mod raw;
pub mod selector;

pub use coalescer::{AggregatedDelta, Coalescer};
pub use dispatcher::{CaptureDispatcher, Listener, ListenerTarget, Phase};
pub use normalizer::EventNormalizer;
pub use raw::{DomEventType, RawEvent};
pub use selector::{SelectorCapability, SelectorResolver};
