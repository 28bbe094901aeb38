//! Event bus utilities providing fan-out, sinks, and event types.
//!
//! The module is organised around a flume-backed [`EventBus`] plus the
//! [`EventSink`] implementations it broadcasts to. Run-level errors travel
//! the same stream as ordinary node events, as [`RunErrorEvent`]s.

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use event::{
    DiagnosticEvent, Event, NodeEvent, RunErrorEvent, RunErrorScope, STREAM_END_SCOPE,
};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
