//! Environment values consumed by `${key}` lookups.

use crate::errors::StackerError;
use std::collections::BTreeMap;
use std::path::Path;

/// Flat key-value environment with command-line overrides.
///
/// Overrides always win over file values, regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    values: BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
}

impl Environment {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an environment from file-level values.
    #[must_use]
    pub fn from_values(values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            overrides: BTreeMap::new(),
        }
    }

    /// Parses an environment file body (a flat YAML mapping).
    pub fn from_yaml_str(text: &str) -> Result<Self, StackerError> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        let mapping = match value {
            serde_yaml::Value::Null => return Ok(Self::new()),
            serde_yaml::Value::Mapping(mapping) => mapping,
            _ => {
                return Err(StackerError::Config(
                    "environment must be a flat key: value mapping".to_string(),
                ));
            }
        };

        let mut values = BTreeMap::new();
        for (key, value) in mapping {
            let key = scalar_to_string(&key).ok_or_else(|| {
                StackerError::Config("environment keys must be scalars".to_string())
            })?;
            let value = scalar_to_string(&value).ok_or_else(|| {
                StackerError::Config(format!("environment value for {key} must be a scalar"))
            })?;
            values.insert(key, value);
        }
        Ok(Self::from_values(values))
    }

    /// Loads an environment file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StackerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StackerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Merges another environment's file values over this one.
    pub fn merge(&mut self, other: Self) {
        self.values.extend(other.values);
        self.overrides.extend(other.overrides);
    }

    /// Sets a file-level value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Sets an override value.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Applies `key=value` override arguments.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, args: &[S]) -> Result<(), StackerError> {
        for arg in args {
            let (key, value) = parse_override(arg.as_ref())?;
            self.overrides.insert(key, value);
        }
        Ok(())
    }

    /// Looks up a key, consulting overrides first.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.overrides
            .get(key)
            .or_else(|| self.values.get(key))
            .map(String::as_str)
    }

    /// Returns true if the key resolves.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values
            .keys()
            .chain(self.overrides.keys())
            .collect::<std::collections::BTreeSet<_>>()
            .len()
    }

    /// Returns true if no keys are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.overrides.is_empty()
    }
}

/// Parses a single `key=value` override.
pub fn parse_override(arg: &str) -> Result<(String, String), StackerError> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(StackerError::Config(format!(
            "invalid environment override \"{arg}\", expected key=value"
        ))),
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}
