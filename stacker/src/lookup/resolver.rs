//! Variable resolution against the environment and the output store.

use super::{lookups_in, parse, Lookup, Segment};
use crate::config::Environment;
use crate::core::Stack;
use crate::errors::{MissingEnvironmentError, MissingOutputError, StackerError};
use crate::outputs::OutputStore;
use std::collections::BTreeMap;
use tracing::debug;

/// Resolved variables of one stack, by name.
pub type ResolvedVariables = BTreeMap<String, serde_json::Value>;

/// How unpublished outputs are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// Every output lookup must be satisfiable.
    #[default]
    Strict,
    /// Unpublished outputs become `<output Stack::Key>` placeholders.
    Preview,
}

/// Resolves a stack's raw variables.
///
/// Resolution is pure: it reads the environment and the output store and
/// never writes to either.
#[derive(Debug, Clone, Copy)]
pub struct VariableResolver<'a> {
    environment: &'a Environment,
    outputs: &'a OutputStore,
    mode: ResolveMode,
}

impl<'a> VariableResolver<'a> {
    /// Creates a strict resolver.
    #[must_use]
    pub fn new(environment: &'a Environment, outputs: &'a OutputStore) -> Self {
        Self {
            environment,
            outputs,
            mode: ResolveMode::Strict,
        }
    }

    /// Sets the resolve mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Resolves every variable of a stack.
    ///
    /// # Errors
    ///
    /// - `MissingEnvironment` for an unknown `${key}`
    /// - `MissingOutput` when a committed stack lacks the requested key
    /// - `Internal` when the referenced stack has not committed yet, which
    ///   means the scheduler ran the stack too early
    pub fn resolve(&self, stack: &Stack) -> Result<ResolvedVariables, StackerError> {
        let mut resolved = ResolvedVariables::new();
        for (name, raw) in stack.variables() {
            let value = self.resolve_value(stack, name, raw)?;
            resolved.insert(name.clone(), value);
        }
        debug!(stack = %stack.fqn(), count = resolved.len(), "Resolved variables");
        Ok(resolved)
    }

    fn resolve_value(
        &self,
        stack: &Stack,
        variable: &str,
        raw: &serde_json::Value,
    ) -> Result<serde_json::Value, StackerError> {
        match raw {
            serde_json::Value::String(text) => self.resolve_string(stack, variable, text),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(stack, variable, item))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            serde_json::Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, item) in map {
                    out.insert(key.clone(), self.resolve_value(stack, variable, item)?);
                }
                Ok(serde_json::Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(
        &self,
        stack: &Stack,
        variable: &str,
        text: &str,
    ) -> Result<serde_json::Value, StackerError> {
        let segments = parse(text).map_err(|e| e.in_variable(stack.name(), variable))?;

        // A lone lookup keeps the looked-up value's type.
        if let [Segment::Lookup(lookup)] = segments.as_slice() {
            return self.resolve_lookup(lookup);
        }

        let mut out = String::with_capacity(text.len());
        for segment in &segments {
            match segment {
                Segment::Literal(literal) => out.push_str(literal),
                Segment::Lookup(lookup) => out.push_str(&value_to_string(&self.resolve_lookup(lookup)?)),
            }
        }
        Ok(serde_json::Value::String(out))
    }

    fn resolve_lookup(&self, lookup: &Lookup) -> Result<serde_json::Value, StackerError> {
        match lookup {
            Lookup::Environment { key } => self
                .environment
                .get(key)
                .map(|value| serde_json::Value::String(value.to_string()))
                .ok_or_else(|| MissingEnvironmentError::new(key.as_str()).into()),
            Lookup::Output { stack, key } => {
                if let Some(value) = self.outputs.get(stack, key) {
                    return Ok(value);
                }
                if self.mode == ResolveMode::Preview {
                    return Ok(serde_json::Value::String(format!("<output {stack}::{key}>")));
                }
                if self.outputs.is_committed(stack) {
                    Err(MissingOutputError::new(stack.as_str(), key.as_str()).into())
                } else {
                    Err(StackerError::Internal(format!(
                        "output {lookup} requested before stack \"{stack}\" completed"
                    )))
                }
            }
        }
    }
}

/// Checks every environment lookup in the given stacks up front.
///
/// # Errors
///
/// Returns `MissingEnvironment` for the first unresolved key in
/// configuration order.
pub fn verify_environment<'s>(
    stacks: impl IntoIterator<Item = &'s Stack>,
    environment: &Environment,
) -> Result<(), StackerError> {
    for stack in stacks {
        for (variable, raw) in stack.variables() {
            let lookups = lookups_in(raw).map_err(|e| e.in_variable(stack.name(), variable))?;
            for lookup in lookups {
                if let Lookup::Environment { key } = lookup {
                    if !environment.contains(&key) {
                        return Err(MissingEnvironmentError::new(key).into());
                    }
                }
            }
        }
    }
    Ok(())
}

/// Renders a resolved value as text for interpolation and parameters.
#[must_use]
pub fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackDefinition;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    fn stack(variables: &[(&str, serde_json::Value)]) -> Stack {
        let mut definition = StackDefinition::new("app", "app.json");
        for (name, value) in variables {
            definition = definition.with_variable(*name, value.clone());
        }
        Stack::new("ns", definition)
    }

    #[test]
    fn test_literals_pass_through() {
        let env = Environment::new();
        let outputs = OutputStore::new();
        let stack = stack(&[("Count", json!(3)), ("Name", json!("web"))]);

        let resolved = VariableResolver::new(&env, &outputs).resolve(&stack).unwrap();
        assert_eq!(resolved.get("Count"), Some(&json!(3)));
        assert_eq!(resolved.get("Name"), Some(&json!("web")));
    }

    #[test]
    fn test_environment_lookup_with_override() {
        let env = Environment::new()
            .with_value("size", "small")
            .with_override("size", "large");
        let outputs = OutputStore::new();
        let stack = stack(&[("Size", json!("${size}")), ("Label", json!("web-${size}"))]);

        let resolved = VariableResolver::new(&env, &outputs).resolve(&stack).unwrap();
        assert_eq!(resolved.get("Size"), Some(&json!("large")));
        assert_eq!(resolved.get("Label"), Some(&json!("web-large")));
    }

    #[test]
    fn test_missing_environment_key() {
        let env = Environment::new();
        let outputs = OutputStore::new();
        let stack = stack(&[("Size", json!("${size}"))]);

        let err = VariableResolver::new(&env, &outputs).resolve(&stack).unwrap_err();
        assert_eq!(err.to_string(), "Environment missing key size.");
    }

    #[test]
    fn test_output_lookup_keeps_type() {
        let env = Environment::new();
        let outputs = OutputStore::new();
        outputs
            .commit(
                "vpc",
                HashMap::from([
                    ("DummyId".to_string(), json!("dummy-1234")),
                    ("Zones".to_string(), json!(["a", "b"])),
                ]),
            )
            .unwrap();
        let stack = stack(&[
            ("VpcId", json!("${output vpc::DummyId}")),
            ("Zones", json!("${output vpc::Zones}")),
            ("Arn", json!("arn:${output vpc::DummyId}")),
        ]);

        let resolved = VariableResolver::new(&env, &outputs).resolve(&stack).unwrap();
        assert_eq!(resolved.get("VpcId"), Some(&json!("dummy-1234")));
        assert_eq!(resolved.get("Zones"), Some(&json!(["a", "b"])));
        assert_eq!(resolved.get("Arn"), Some(&json!("arn:dummy-1234")));
    }

    #[test]
    fn test_missing_output_after_completion_is_fatal() {
        let env = Environment::new();
        let outputs = OutputStore::new();
        outputs.commit("vpc", HashMap::new()).unwrap();
        let stack = stack(&[("VpcId", json!("${output vpc::VpcId}"))]);

        let err = VariableResolver::new(&env, &outputs).resolve(&stack).unwrap_err();
        assert!(matches!(err, StackerError::MissingOutput(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_output_before_completion_is_internal() {
        let env = Environment::new();
        let outputs = OutputStore::new();
        let stack = stack(&[("VpcId", json!("${output vpc::VpcId}"))]);

        let err = VariableResolver::new(&env, &outputs).resolve(&stack).unwrap_err();
        assert!(matches!(err, StackerError::Internal(_)));
    }

    #[test]
    fn test_preview_placeholder() {
        let env = Environment::new();
        let outputs = OutputStore::new();
        let stack = stack(&[("VpcId", json!("${output vpc::VpcId}"))]);

        let resolved = VariableResolver::new(&env, &outputs)
            .with_mode(ResolveMode::Preview)
            .resolve(&stack)
            .unwrap();
        assert_eq!(resolved.get("VpcId"), Some(&json!("<output vpc::VpcId>")));
    }

    #[test]
    fn test_nested_values_resolved() {
        let env = Environment::new().with_value("env", "prod");
        let outputs = OutputStore::new();
        let stack = stack(&[("Tags", json!({"Env": "${env}", "Names": ["a-${env}"]}))]);

        let resolved = VariableResolver::new(&env, &outputs).resolve(&stack).unwrap();
        assert_eq!(
            resolved.get("Tags"),
            Some(&json!({"Env": "prod", "Names": ["a-prod"]}))
        );
    }

    #[test]
    fn test_verify_environment_reports_first_missing() {
        let env = Environment::new().with_value("present", "1");
        let stacks = vec![
            stack(&[("A", json!("${present}"))]),
            stack(&[("B", json!("x-${absent}"))]),
        ];

        let err = verify_environment(&stacks, &env).unwrap_err();
        assert_eq!(err.to_string(), "Environment missing key absent.");
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("a")), "a");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&json!(12)), "12");
        assert_eq!(value_to_string(&serde_json::Value::Null), "");
    }
}
