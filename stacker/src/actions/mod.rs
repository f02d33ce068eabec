//! Per-stack action state machines.
//!
//! Every stack starts `pending`. An action reports `submitted` itself right
//! before a mutating provider call; the executor reports the terminal
//! status the action returns. Outputs are committed before an action
//! returns, so dependents always see them.

mod build;
mod destroy;
mod diff;

pub use build::BuildAction;
pub use destroy::DestroyAction;
pub use diff::DiffAction;

use crate::context::RunContext;
use crate::core::{Stack, StackStatus};
use crate::errors::StackerError;
use crate::graph::Direction;
use crate::provider::StackDiff;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The three run types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Create or update stacks.
    Build,
    /// Tear stacks down.
    Destroy,
    /// Report planned changes.
    Diff,
}

impl ActionKind {
    /// Traversal direction for this action.
    #[must_use]
    pub fn direction(self) -> Direction {
        match self {
            Self::Build | Self::Diff => Direction::Forward,
            Self::Destroy => Direction::Reverse,
        }
    }

    /// Whether the action can change infrastructure.
    #[must_use]
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Diff)
    }

    /// Returns the action implementation.
    #[must_use]
    pub fn action(self) -> Arc<dyn StackAction> {
        match self {
            Self::Build => Arc::new(BuildAction),
            Self::Destroy => Arc::new(DestroyAction),
            Self::Diff => Arc::new(DiffAction),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Destroy => write!(f, "destroy"),
            Self::Diff => write!(f, "diff"),
        }
    }
}

/// The result of one stack's action.
#[derive(Debug, Clone, PartialEq)]
pub struct StackOutcome {
    /// Terminal status.
    pub status: StackStatus,
    /// Computed changes, when a diff was taken.
    pub diff: Option<StackDiff>,
}

impl StackOutcome {
    /// An outcome without a diff.
    #[must_use]
    pub fn new(status: StackStatus) -> Self {
        Self { status, diff: None }
    }

    /// Attaches a diff.
    #[must_use]
    pub fn with_diff(mut self, diff: StackDiff) -> Self {
        self.diff = Some(diff);
        self
    }
}

/// Drives one stack through an action.
#[async_trait]
pub trait StackAction: Send + Sync {
    /// Which action this is.
    fn kind(&self) -> ActionKind;

    /// Runs the action for one stack.
    ///
    /// # Errors
    ///
    /// Stack-local errors fail this stack only; fatal errors stop the run.
    async fn execute(&self, ctx: &RunContext, stack: &Stack) -> Result<StackOutcome, StackerError>;
}

/// Publishes a stack's current remote outputs, if it exists.
///
/// Returns whether the stack exists.
pub(crate) async fn publish_existing_outputs(
    ctx: &RunContext,
    stack: &Stack,
) -> Result<bool, StackerError> {
    let existing = ctx
        .provider_call(stack, "describe", ctx.provider().describe(stack.fqn()))
        .await?;
    match existing {
        Some(remote) => {
            ctx.outputs().commit(stack.name(), remote.output_map())?;
            Ok(true)
        }
        None => Ok(false),
    }
}
