//! Hook runner that records instead of executing.

use crate::hooks::{HookDefinition, HookRunner, HookStage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Records every hook it is asked to run.
///
/// Hooks succeed unless marked failing (`Ok(false)`) or erroring (`Err`).
#[derive(Debug, Default)]
pub struct RecordingHooks {
    failing: HashSet<String>,
    erroring: HashMap<String, String>,
    calls: Mutex<Vec<(HookStage, String)>>,
}

impl RecordingHooks {
    /// Creates a runner where every hook succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a hook report failure.
    #[must_use]
    pub fn failing(mut self, path: impl Into<String>) -> Self {
        self.failing.insert(path.into());
        self
    }

    /// Makes a hook impossible to run.
    #[must_use]
    pub fn erroring(mut self, path: impl Into<String>, message: impl Into<String>) -> Self {
        self.erroring.insert(path.into(), message.into());
        self
    }

    /// Returns `(stage, path)` for every run, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(HookStage, String)> {
        self.calls.lock().clone()
    }

    /// Returns the paths of every run, in order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, path)| path.clone()).collect()
    }
}

#[async_trait]
impl HookRunner for RecordingHooks {
    async fn run(&self, stage: HookStage, hook: &HookDefinition) -> Result<bool, String> {
        self.calls.lock().push((stage, hook.path.clone()));
        if let Some(message) = self.erroring.get(&hook.path) {
            return Err(message.clone());
        }
        Ok(!self.failing.contains(&hook.path))
    }
}
