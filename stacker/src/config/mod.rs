//! Configuration loading.
//!
//! A configuration is a YAML mapping with a `namespace` and a non-empty list
//! of `stacks`. Shape errors are reported before any stack is examined.

mod environment;

pub use environment::{parse_override, Environment};

use crate::errors::{ConfigStructureError, StackerError};
use crate::hooks::{BuildHooks, HookDefinition};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Declaration of a single stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDefinition {
    /// The stack name, unique within the configuration.
    pub name: String,
    /// Blueprint reference handed to the blueprint source.
    #[serde(alias = "template_path")]
    pub class_path: String,
    /// Raw variables; values may contain lookups.
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    /// Whether updates require confirmation or force.
    #[serde(default, alias = "locked")]
    pub protected: bool,
    /// Disabled stacks are never submitted.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl StackDefinition {
    /// Creates a new stack definition.
    #[must_use]
    pub fn new(name: impl Into<String>, class_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_path: class_path.into(),
            variables: BTreeMap::new(),
            protected: false,
            enabled: true,
        }
    }

    /// Adds a variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Marks the stack as protected.
    #[must_use]
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Marks the stack as disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A parsed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Prefix applied to every stack's external name. May be empty.
    #[serde(deserialize_with = "deserialize_namespace")]
    pub namespace: String,
    /// Stacks in declaration order.
    pub stacks: Vec<StackDefinition>,
    /// Tags attached to every stack on create/update.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Hooks run before a build.
    #[serde(default)]
    pub pre_build: Vec<HookDefinition>,
    /// Hooks run after a successful build.
    #[serde(default)]
    pub post_build: Vec<HookDefinition>,
}

fn deserialize_namespace<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

impl Config {
    /// Creates a configuration from parts.
    #[must_use]
    pub fn new(namespace: impl Into<String>, stacks: Vec<StackDefinition>) -> Self {
        Self {
            namespace: namespace.into(),
            stacks,
            tags: BTreeMap::new(),
            pre_build: Vec::new(),
            post_build: Vec::new(),
        }
    }

    /// Adds a hook run before the build.
    #[must_use]
    pub fn with_pre_build(mut self, hook: HookDefinition) -> Self {
        self.pre_build.push(hook);
        self
    }

    /// Adds a hook run after a successful build.
    #[must_use]
    pub fn with_post_build(mut self, hook: HookDefinition) -> Self {
        self.post_build.push(hook);
        self
    }

    /// Returns the build hooks.
    #[must_use]
    pub fn hooks(&self) -> BuildHooks {
        BuildHooks {
            pre_build: self.pre_build.clone(),
            post_build: self.post_build.clone(),
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Parses a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, StackerError> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        Self::from_value(value)
    }

    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StackerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StackerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Validates the top-level shape, then deserializes.
    ///
    /// # Errors
    ///
    /// Returns `ConfigStructure` when fewer than the two required fields are
    /// present or `stacks` is empty.
    pub fn from_value(value: serde_yaml::Value) -> Result<Self, StackerError> {
        let mapping = match value {
            serde_yaml::Value::Mapping(mapping) => mapping,
            serde_yaml::Value::Null => serde_yaml::Mapping::new(),
            _ => {
                return Err(ConfigStructureError::new("expected a mapping at the top level").into());
            }
        };

        if mapping.len() < 2 {
            return Err(ConfigStructureError::new(format!(
                "expected `namespace` and `stacks`, found {} top-level field(s)",
                mapping.len()
            ))
            .into());
        }

        for required in ["namespace", "stacks"] {
            if !mapping.contains_key(required) {
                return Err(ConfigStructureError::new(format!(
                    "missing required field `{required}`"
                ))
                .into());
            }
        }

        let config: Self = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))?;
        if config.stacks.is_empty() {
            return Err(ConfigStructureError::new("`stacks` must not be empty").into());
        }
        Ok(config)
    }

    /// Returns the externally visible name for a stack.
    #[must_use]
    pub fn fqn(&self, stack_name: &str) -> String {
        fully_qualified_name(&self.namespace, stack_name)
    }
}

/// Joins a namespace and a stack name as `{namespace}-{name}`.
#[must_use]
pub fn fully_qualified_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}-{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::from_yaml_str(
            "namespace: ns\nstacks:\n  - name: vpc\n    class_path: blueprints/vpc.json\n",
        )
        .unwrap();

        assert_eq!(config.namespace, "ns");
        assert_eq!(config.stacks.len(), 1);
        assert_eq!(config.stacks[0].name, "vpc");
        assert!(config.stacks[0].enabled);
        assert!(!config.stacks[0].protected);
        assert_eq!(config.fqn("vpc"), "ns-vpc");
    }

    #[test]
    fn test_empty_config_is_incomplete() {
        let err = Config::from_yaml_str("").unwrap_err();
        assert!(matches!(err, StackerError::ConfigStructure(_)));
    }

    #[test]
    fn test_single_field_config_is_incomplete() {
        let err = Config::from_yaml_str("namespace: ns\n").unwrap_err();
        assert!(matches!(err, StackerError::ConfigStructure(_)));
        assert!(err.to_string().starts_with("Configuration incomplete"));
    }

    #[test]
    fn test_missing_stacks_field() {
        let err = Config::from_yaml_str("namespace: ns\ntags: {}\n").unwrap_err();
        assert!(err.to_string().contains("`stacks`"));
    }

    #[test]
    fn test_empty_stack_list() {
        let err = Config::from_yaml_str("namespace: ns\nstacks: []\n").unwrap_err();
        assert!(matches!(err, StackerError::ConfigStructure(_)));
    }

    #[test]
    fn test_empty_namespace() {
        let config = Config::from_yaml_str(
            "namespace:\nstacks:\n  - name: vpc\n    class_path: vpc.json\n",
        )
        .unwrap();
        assert_eq!(config.namespace, "");
        assert_eq!(config.fqn("vpc"), "vpc");
    }

    #[test]
    fn test_locked_alias_and_variables() {
        let config = Config::from_yaml_str(
            r#"
namespace: prod
tags:
  team: infra
stacks:
  - name: db
    template_path: db.yaml
    locked: true
    enabled: false
    variables:
      Size: 20
      VpcId: ${output vpc::VpcId}
"#,
        )
        .unwrap();

        let db = &config.stacks[0];
        assert!(db.protected);
        assert!(!db.enabled);
        assert_eq!(db.class_path, "db.yaml");
        assert_eq!(db.variables.get("Size"), Some(&serde_json::json!(20)));
        assert_eq!(
            db.variables.get("VpcId"),
            Some(&serde_json::json!("${output vpc::VpcId}"))
        );
        assert_eq!(config.tags.get("team"), Some(&"infra".to_string()));
    }

    #[test]
    fn test_build_hooks() {
        let config = Config::from_yaml_str(
            r#"
namespace: prod
pre_build:
  - path: scripts/check.sh
    args:
      region: us-east-1
post_build:
  - path: notify
    required: false
stacks:
  - name: vpc
    class_path: vpc.json
"#,
        )
        .unwrap();

        let hooks = config.hooks();
        assert_eq!(
            hooks.pre_build,
            vec![HookDefinition::new("scripts/check.sh")
                .with_arg("region", serde_json::json!("us-east-1"))]
        );
        assert_eq!(hooks.post_build, vec![HookDefinition::new("notify").optional()]);
        assert!(Config::new("ns", Vec::new()).hooks().is_empty());
    }
}
