//! Run results.

use crate::actions::ActionKind;
use crate::core::StackStatus;
use crate::provider::StackDiff;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The final state of one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackReport {
    /// Configured name.
    pub name: String,
    /// Fully qualified name.
    pub fqn: String,
    /// Terminal status.
    pub status: StackStatus,
    /// Changes applied or planned, when computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<StackDiff>,
}

/// The result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run id shared with every status event.
    pub run_id: Uuid,
    /// What was run.
    pub action: ActionKind,
    /// Stacks in processing order.
    pub stacks: Vec<StackReport>,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
    /// Whether the run was cancelled before finishing.
    pub cancelled: bool,
}

impl RunReport {
    /// True when every stack completed or was skipped.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.cancelled && self.stacks.iter().all(|s| s.status.is_success())
    }

    /// Process exit code: 0 on success, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.success())
    }

    /// Returns a stack's report by configured name.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&StackReport> {
        self.stacks.iter().find(|s| s.name == name)
    }

    /// Returns a stack's status by configured name.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<&StackStatus> {
        self.stack(name).map(|s| &s.status)
    }

    /// Returns the stacks that failed, were blocked or were cancelled.
    #[must_use]
    pub fn failures(&self) -> Vec<&StackReport> {
        self.stacks.iter().filter(|s| s.status.is_failure()).collect()
    }

    /// Returns configured names in processing order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stacks.iter().map(|s| s.name.as_str()).collect()
    }
}
