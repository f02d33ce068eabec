//! Event sink trait and implementations.

use crate::core::StatusEvent;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, warn, Level};

/// Receives status events.
///
/// Sinks must not fail the run: delivery problems are logged and dropped.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers an event.
    async fn emit(&self, event: &StatusEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &StatusEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &StatusEvent) {
        if self.level == Level::DEBUG {
            debug!(
                run_id = %event.run_id,
                stack = %event.stack,
                status = %event.status,
                "Stack status changed"
            );
        } else {
            info!(
                run_id = %event.run_id,
                stack = %event.stack,
                status = %event.status,
                "Stack status changed"
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &StatusEvent) {
        self.log_event(event);
    }
}

/// Prints `"{stack}: {status}"` lines.
///
/// Lines from concurrent stacks are written whole, one at a time.
pub struct ConsoleEventSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleEventSink {
    /// Creates a sink writing to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Creates a sink writing to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn write_line(&self, event: &StatusEvent) {
        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{}", event.line()).and_then(|()| writer.flush()) {
            warn!(error = %e, stack = %event.stack, "Failed to write status line");
        }
    }
}

impl Default for ConsoleEventSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for ConsoleEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleEventSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventSink for ConsoleEventSink {
    async fn emit(&self, event: &StatusEvent) {
        self.write_line(event);
    }
}

/// Keeps every event, for tests and reports.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<StatusEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.read().clone()
    }

    /// Returns the rendered status lines in arrival order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.events.read().iter().map(StatusEvent::line).collect()
    }

    /// Returns the events of one stack.
    #[must_use]
    pub fn events_for(&self, stack: &str) -> Vec<StatusEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.stack == stack)
            .cloned()
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &StatusEvent) {
        self.events.write().push(event.clone());
    }
}

/// Delivers each event to several sinks in order.
#[derive(Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    /// Creates an empty fanout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl std::fmt::Debug for FanoutEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutEventSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[async_trait]
impl EventSink for FanoutEventSink {
    async fn emit(&self, event: &StatusEvent) {
        for sink in &self.sinks {
            sink.emit(event).await;
        }
    }
}
