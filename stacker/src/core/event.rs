//! Status events emitted on every stack transition.

use super::StackStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single status transition of one stack.
///
/// Events are consumed by event sinks for console output, logging or tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// The run that produced the event.
    pub run_id: Uuid,
    /// The fully qualified stack name.
    pub stack: String,
    /// The new status.
    pub status: StackStatus,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    /// Creates a new status event stamped with the current time.
    #[must_use]
    pub fn new(run_id: Uuid, stack: impl Into<String>, status: StackStatus) -> Self {
        Self {
            run_id,
            stack: stack.into(),
            status,
            timestamp: Utc::now(),
        }
    }

    /// Renders the operator-facing status line, `"{stack}: {status}"`.
    #[must_use]
    pub fn line(&self) -> String {
        format!("{}: {}", self.stack, self.status)
    }
}
