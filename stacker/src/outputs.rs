//! Run-scoped store of published stack outputs.

use crate::errors::StackerError;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Outputs published by stacks that reached a successful terminal state.
///
/// Each stack commits exactly once per run and entries are never removed,
/// so a single lock is enough to avoid lost updates. The store is passed to
/// each run explicitly; independent runs never share one.
#[derive(Debug, Default)]
pub struct OutputStore {
    entries: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
}

impl OutputStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the outputs of a stack.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the stack already committed during this run.
    pub fn commit(
        &self,
        stack: &str,
        outputs: HashMap<String, serde_json::Value>,
    ) -> Result<(), StackerError> {
        let mut entries = self.entries.write();
        if entries.contains_key(stack) {
            return Err(StackerError::Internal(format!(
                "outputs for stack \"{stack}\" were already committed"
            )));
        }
        entries.insert(stack.to_string(), outputs);
        Ok(())
    }

    /// Returns one output value.
    #[must_use]
    pub fn get(&self, stack: &str, key: &str) -> Option<serde_json::Value> {
        self.entries
            .read()
            .get(stack)
            .and_then(|outputs| outputs.get(key))
            .cloned()
    }

    /// Returns true once the stack has committed its outputs.
    #[must_use]
    pub fn is_committed(&self, stack: &str) -> bool {
        self.entries.read().contains_key(stack)
    }

    /// Returns all outputs of one stack.
    #[must_use]
    pub fn outputs_of(&self, stack: &str) -> Option<HashMap<String, serde_json::Value>> {
        self.entries.read().get(stack).cloned()
    }

    /// Returns a copy of the whole store.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, HashMap<String, serde_json::Value>> {
        self.entries.read().clone()
    }

    /// Returns the number of committed stacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing was committed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
