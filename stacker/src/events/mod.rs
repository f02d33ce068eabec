//! Status event delivery.
//!
//! Every stack transition becomes a [`StatusEvent`](crate::core::StatusEvent)
//! handed to an [`EventSink`]. The console sink prints the operator-facing
//! lines; the logging sink forwards to `tracing`; the collecting sink keeps
//! events for assertions.

mod sink;

pub use sink::{
    CollectingEventSink, ConsoleEventSink, EventSink, FanoutEventSink, LoggingEventSink,
    NoOpEventSink,
};
