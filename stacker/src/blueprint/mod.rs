//! Blueprints: the templates stacks are rendered from.
//!
//! A blueprint declares its parameters (required, or defaulted) and the
//! outputs it publishes. Resolved variables become provider parameters
//! through [`build_parameters`].

mod file;

pub use file::FileBlueprints;

use crate::core::Stack;
use crate::errors::{MissingVariableError, StackerError};
use crate::lookup::{value_to_string, ResolvedVariables};
use crate::provider::RemoteStack;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// A parameter declared by a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Parameter name.
    pub name: String,
    /// Default used when no variable supplies a value.
    pub default: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

impl ParameterDefinition {
    /// Returns true if the parameter has no default.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A rendered blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    /// The stack the blueprint was rendered for.
    pub name: String,
    /// The template body.
    pub template: serde_json::Value,
    /// Declared parameters, in template order.
    pub parameters: Vec<ParameterDefinition>,
    /// Declared output names.
    pub outputs: Vec<String>,
}

impl Blueprint {
    /// Reads parameter and output declarations from a template.
    ///
    /// Parameters live under `Parameters` (with optional `Default` and
    /// `Description`), outputs under `Outputs`.
    #[must_use]
    pub fn from_template(name: impl Into<String>, template: serde_json::Value) -> Self {
        let parameters = template
            .get("Parameters")
            .and_then(serde_json::Value::as_object)
            .map(|params| {
                params
                    .iter()
                    .map(|(name, body)| ParameterDefinition {
                        name: name.clone(),
                        default: body
                            .get("Default")
                            .filter(|v| !v.is_null())
                            .map(value_to_string),
                        description: body
                            .get("Description")
                            .and_then(serde_json::Value::as_str)
                            .map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let outputs = template
            .get("Outputs")
            .and_then(serde_json::Value::as_object)
            .map(|outputs| outputs.keys().cloned().collect())
            .unwrap_or_default();

        Self {
            name: name.into(),
            template,
            parameters,
            outputs,
        }
    }

    /// Returns a parameter declaration by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Returns the names of parameters without defaults.
    #[must_use]
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.is_required())
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// Produces blueprints for stacks.
#[async_trait]
pub trait BlueprintSource: Send + Sync + std::fmt::Debug {
    /// Renders the blueprint named by the stack's class path.
    async fn render(
        &self,
        stack: &Stack,
        variables: &ResolvedVariables,
    ) -> Result<Blueprint, StackerError>;
}

/// Turns resolved variables into provider parameters.
///
/// - variables the blueprint does not declare are dropped
/// - `null` values are dropped so the default applies
/// - booleans become `"true"`/`"false"`, other values are stringified
/// - a required parameter nobody supplied is taken from the existing
///   remote stack, and is an error if there is none
pub fn build_parameters(
    stack: &Stack,
    blueprint: &Blueprint,
    variables: &ResolvedVariables,
    existing: Option<&RemoteStack>,
) -> Result<BTreeMap<String, String>, StackerError> {
    for name in variables.keys() {
        if blueprint.parameter(name).is_none() {
            debug!(stack = %stack.fqn(), parameter = %name, "Blueprint does not use parameter");
        }
    }

    let mut parameters = BTreeMap::new();
    for definition in &blueprint.parameters {
        let supplied = variables
            .get(&definition.name)
            .filter(|value| !value.is_null())
            .map(|value| match value {
                serde_json::Value::Bool(flag) => flag.to_string(),
                other => value_to_string(other),
            });

        let value = match (supplied, &definition.default) {
            (Some(value), _) => value,
            (None, Some(default)) => default.clone(),
            (None, None) => {
                let previous = existing.and_then(|remote| remote.parameters.get(&definition.name));
                match previous {
                    Some(value) => {
                        debug!(
                            stack = %stack.fqn(),
                            parameter = %definition.name,
                            "Using previous value for missing parameter"
                        );
                        value.clone()
                    }
                    None => {
                        return Err(MissingVariableError::new(stack.name(), definition.name.as_str()).into())
                    }
                }
            }
        };
        parameters.insert(definition.name.clone(), value);
    }
    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackDefinition;
    use crate::provider::StackRequest;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn blueprint() -> Blueprint {
        Blueprint::from_template(
            "app",
            json!({
                "Parameters": {
                    "ImageId": {"Description": "AMI"},
                    "Public": {},
                    "Size": {"Default": "small"},
                    "Count": {"Default": 2}
                },
                "Outputs": {"Url": {"Value": "http://app"}}
            }),
        )
    }

    fn stack() -> Stack {
        Stack::new("ns", StackDefinition::new("app", "app.json"))
    }

    fn vars(pairs: &[(&str, serde_json::Value)]) -> ResolvedVariables {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_from_template() {
        let bp = blueprint();
        assert_eq!(bp.parameters.len(), 4);
        assert_eq!(bp.required_parameters(), vec!["ImageId", "Public"]);
        assert_eq!(bp.parameter("Count").unwrap().default.as_deref(), Some("2"));
        assert_eq!(bp.parameter("ImageId").unwrap().description.as_deref(), Some("AMI"));
        assert_eq!(bp.outputs, vec!["Url"]);
    }

    #[test]
    fn test_normalisation() {
        let params = build_parameters(
            &stack(),
            &blueprint(),
            &vars(&[
                ("ImageId", json!("ami-1")),
                ("Public", json!(true)),
                ("Size", serde_json::Value::Null),
                ("Unused", json!("dropped")),
            ]),
            None,
        )
        .unwrap();

        assert_eq!(params.get("ImageId").map(String::as_str), Some("ami-1"));
        assert_eq!(params.get("Public").map(String::as_str), Some("true"));
        assert_eq!(params.get("Size").map(String::as_str), Some("small"));
        assert_eq!(params.get("Count").map(String::as_str), Some("2"));
        assert!(!params.contains_key("Unused"));
    }

    #[test]
    fn test_missing_required_parameter() {
        let err = build_parameters(
            &stack(),
            &blueprint(),
            &vars(&[("Public", json!(false))]),
            None,
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "Variable \"ImageId\" in blueprint \"app\" is missing");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_missing_required_taken_from_existing_stack() {
        let existing = RemoteStack::from_request(&StackRequest::new(
            "ns-app",
            json!({}),
            BTreeMap::from([("ImageId".to_string(), "ami-old".to_string())]),
            BTreeMap::new(),
        ));

        let params = build_parameters(
            &stack(),
            &blueprint(),
            &vars(&[("Public", json!(false))]),
            Some(&existing),
        )
        .unwrap();
        assert_eq!(params.get("ImageId").map(String::as_str), Some("ami-old"));
        assert_eq!(params.get("Public").map(String::as_str), Some("false"));
    }
}
