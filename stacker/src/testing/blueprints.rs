//! In-memory blueprints.

use crate::blueprint::{Blueprint, BlueprintSource};
use crate::core::Stack;
use crate::errors::StackerError;
use crate::lookup::ResolvedVariables;
use async_trait::async_trait;
use std::collections::HashMap;

/// Blueprints keyed by class path.
#[derive(Debug, Clone, Default)]
pub struct StaticBlueprints {
    templates: HashMap<String, serde_json::Value>,
}

impl StaticBlueprints {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template under a class path.
    #[must_use]
    pub fn with_template(mut self, class_path: impl Into<String>, template: serde_json::Value) -> Self {
        self.templates.insert(class_path.into(), template);
        self
    }
}

#[async_trait]
impl BlueprintSource for StaticBlueprints {
    async fn render(
        &self,
        stack: &Stack,
        _variables: &ResolvedVariables,
    ) -> Result<Blueprint, StackerError> {
        let template = self.templates.get(stack.class_path()).ok_or_else(|| {
            StackerError::blueprint(stack.name(), format!("unknown class path {}", stack.class_path()))
        })?;
        Ok(Blueprint::from_template(stack.name(), template.clone()))
    }
}

/// Builds a template with required parameters and literal outputs.
///
/// Every parameter is also published as an output of the same name, so
/// values flowing through a stack can be observed downstream.
#[must_use]
pub fn template(parameters: &[&str], outputs: &[(&str, serde_json::Value)]) -> serde_json::Value {
    let mut params = serde_json::Map::new();
    let mut outs = serde_json::Map::new();
    for name in parameters {
        params.insert((*name).to_string(), serde_json::json!({"Type": "String"}));
        outs.insert((*name).to_string(), serde_json::json!({"Value": {"Ref": name}}));
    }
    for (name, value) in outputs {
        outs.insert((*name).to_string(), serde_json::json!({"Value": value}));
    }
    serde_json::json!({
        "Parameters": params,
        "Resources": {"Dummy": {"Type": "Dummy"}},
        "Outputs": outs,
    })
}
