//! Output targets for workflow events.

use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};

use super::event::Event;

/// Abstraction over an output target that consumes full [`Event`] objects.
pub trait EventSink: Send + Sync {
    /// Handle a structured event. The sink decides how to render it.
    fn handle(&mut self, event: &Event) -> IoResult<()>;
}

/// Stdout sink using the event's `Display` rendering.
pub struct StdOutSink {
    handle: Stdout,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
        }
    }
}

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        writeln!(self.handle, "{event}")?;
        self.handle.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured events.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.lock().unwrap().clone()
    }

    /// Clear all captured events.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.entries.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Channel-based sink for streaming to async consumers.
///
/// Events are forwarded to a flume channel without blocking; a disconnected
/// receiver is not an error (the consumer simply went away).
pub struct ChannelSink {
    tx: flume::Sender<Event>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: flume::Sender<Event>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// MemorySink captures events in order and clears on request.
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.handle(&Event::diagnostic("a", "one")).unwrap();
        sink.handle(&Event::diagnostic("b", "two")).unwrap();
        let events = sink.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message(), "one");
        sink.clear();
        assert!(sink.snapshot().is_empty());
    }

    #[test]
    /// ChannelSink forwards events and tolerates a dropped receiver.
    fn test_channel_sink() {
        let (tx, rx) = flume::unbounded();
        let mut sink = ChannelSink::new(tx);
        sink.handle(&Event::diagnostic("s", "m")).unwrap();
        assert_eq!(rx.recv().unwrap().message(), "m");
        drop(rx);
        // Disconnected receiver is not an error.
        sink.handle(&Event::diagnostic("s", "m2")).unwrap();
    }
}
