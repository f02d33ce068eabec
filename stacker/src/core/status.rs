//! Stack status and its rendering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable reason strings carried by status transitions.
pub mod reason {
    /// A stack that did not exist is being created.
    pub const CREATING: &str = "creating new stack";
    /// An existing stack is being updated.
    pub const UPDATING: &str = "updating existing stack";
    /// Desired and remote state are identical.
    pub const NO_CHANGE: &str = "nochange";
    /// The stack is disabled in configuration.
    pub const DISABLED: &str = "disabled";
    /// A destroy request was accepted.
    pub const SUBMITTED_FOR_DESTRUCTION: &str = "submitted for destruction";
    /// A destroy request finished.
    pub const DESTROYED: &str = "stack destroyed";
    /// There was nothing to destroy.
    pub const DOES_NOT_EXIST: &str = "stack does not exist";
    /// Diff only: the stack would be created.
    pub const WOULD_CREATE: &str = "would create new stack";
    /// Diff only: the stack would be updated.
    pub const WOULD_UPDATE: &str = "would update existing stack";
}

/// The status of one stack within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum StackStatus {
    /// Waiting to be processed.
    Pending,
    /// A mutating provider call is in flight.
    Submitted(String),
    /// Nothing was done.
    Skipped(String),
    /// The action finished successfully.
    Complete(String),
    /// The action failed.
    Failed(String),
    /// Never dispatched because a dependency failed. Holds that dependency.
    Blocked(String),
    /// Never dispatched because the run was aborted.
    Cancelled,
}

impl Default for StackStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Submitted(reason) => write!(f, "submitted ({reason})"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            Self::Complete(reason) => write!(f, "complete ({reason})"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
            Self::Blocked(dependency) => {
                write!(f, "failed (blocked by dependency failure: {dependency})")
            }
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl StackStatus {
    /// Creates a submitted status.
    #[must_use]
    pub fn submitted(reason: impl Into<String>) -> Self {
        Self::Submitted(reason.into())
    }

    /// Creates a skipped status.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }

    /// Creates a complete status.
    #[must_use]
    pub fn complete(reason: impl Into<String>) -> Self {
        Self::Complete(reason.into())
    }

    /// Creates a failed status.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Submitted(_))
    }

    /// Returns true if dependents may proceed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Skipped(_))
    }

    /// Returns true if the status counts against the run's exit status.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Blocked(_) | Self::Cancelled)
    }

    /// Returns the bare state name without the reason.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted(_) => "submitted",
            Self::Skipped(_) => "skipped",
            Self::Complete(_) => "complete",
            Self::Failed(_) | Self::Blocked(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}
