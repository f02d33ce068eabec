//! Runtime stack handle.

use crate::config::{fully_qualified_name, StackDefinition};
use std::collections::BTreeMap;

/// A configured stack bound to its namespace.
///
/// Built once per run from the configuration and never mutated; per-run
/// status lives in the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    definition: StackDefinition,
    fqn: String,
}

impl Stack {
    /// Binds a definition to a namespace.
    #[must_use]
    pub fn new(namespace: &str, definition: StackDefinition) -> Self {
        let fqn = fully_qualified_name(namespace, &definition.name);
        Self { definition, fqn }
    }

    /// The configured name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// The externally visible `{namespace}-{name}`.
    #[must_use]
    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    /// The blueprint reference.
    #[must_use]
    pub fn class_path(&self) -> &str {
        &self.definition.class_path
    }

    /// The raw variables.
    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.definition.variables
    }

    /// Whether updates need confirmation or force.
    #[must_use]
    pub fn protected(&self) -> bool {
        self.definition.protected
    }

    /// Whether the stack may be submitted.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.definition.enabled
    }

    /// The underlying definition.
    #[must_use]
    pub fn definition(&self) -> &StackDefinition {
        &self.definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fqn() {
        let stack = Stack::new("ns", StackDefinition::new("vpc", "vpc.json"));
        assert_eq!(stack.fqn(), "ns-vpc");
        assert_eq!(stack.name(), "vpc");

        let bare = Stack::new("", StackDefinition::new("vpc", "vpc.json"));
        assert_eq!(bare.fqn(), "vpc");
    }
}
