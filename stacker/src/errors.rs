//! Error types for the stacker orchestrator.
//!
//! Errors fall into two groups. Structural errors (configuration shape,
//! duplicate names, unknown references, cycles, missing environment keys)
//! abort the whole run before any provider call. Stack-local errors (missing
//! variables, provider failures, declined confirmations) fail a single stack
//! and block its dependents while unrelated branches keep running.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for stacker operations.
#[derive(Debug, Error)]
pub enum StackerError {
    /// The configuration is missing required top-level structure.
    #[error("{0}")]
    ConfigStructure(#[from] ConfigStructureError),

    /// Two stacks share a name.
    #[error("{0}")]
    DuplicateStack(#[from] DuplicateStackError),

    /// An output lookup targets a stack that is not declared.
    #[error("{0}")]
    UnknownStackReference(#[from] UnknownStackReferenceError),

    /// Output lookups form a cycle.
    #[error("{0}")]
    CyclicDependency(#[from] CycleDetectedError),

    /// An environment lookup names a key nobody supplied.
    #[error("{0}")]
    MissingEnvironment(#[from] MissingEnvironmentError),

    /// A blueprint parameter was never resolved.
    #[error("{0}")]
    MissingVariable(#[from] MissingVariableError),

    /// A completed stack did not publish an output someone looked up.
    #[error("{0}")]
    MissingOutput(#[from] MissingOutputError),

    /// A `${...}` expression could not be parsed.
    #[error("{0}")]
    LookupSyntax(#[from] LookupSyntaxError),

    /// The provider reported a failure.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// A confirmation-gated change was not confirmed.
    #[error("{0}")]
    ConfirmationDeclined(#[from] ConfirmationDeclinedError),

    /// A blueprint could not be rendered.
    #[error("Blueprint error in stack \"{stack}\": {message}")]
    Blueprint {
        /// The stack whose blueprint failed.
        stack: String,
        /// What went wrong.
        message: String,
    },

    /// A required build hook failed.
    #[error("{stage} hook {path} failed: {message}")]
    Hook {
        /// `pre_build` or `post_build`.
        stage: String,
        /// The hook that failed.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// A configuration or environment input could not be read.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An engine invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StackerError {
    /// Creates a blueprint error.
    #[must_use]
    pub fn blueprint(stack: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Blueprint {
            stack: stack.into(),
            message: message.into(),
        }
    }

    /// Creates a hook error.
    #[must_use]
    pub fn hook(stage: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            stage: stage.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error must abort the whole run.
    ///
    /// Non-fatal errors only fail the stack that raised them.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::MissingVariable(_)
                | Self::Provider(_)
                | Self::ConfirmationDeclined(_)
                | Self::Blueprint { .. }
        )
    }

    /// Returns a stable code identifying the error class.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigStructure(_) => "STACKER-CONFIG-INCOMPLETE",
            Self::DuplicateStack(_) => "STACKER-DUPLICATE",
            Self::UnknownStackReference(_) => "STACKER-UNKNOWN-REF",
            Self::CyclicDependency(_) => "STACKER-CYCLE",
            Self::MissingEnvironment(_) => "STACKER-MISSING-ENV",
            Self::MissingVariable(_) => "STACKER-MISSING-VAR",
            Self::MissingOutput(_) => "STACKER-MISSING-OUTPUT",
            Self::LookupSyntax(_) => "STACKER-LOOKUP-SYNTAX",
            Self::Provider(_) => "STACKER-PROVIDER",
            Self::ConfirmationDeclined(_) => "STACKER-DECLINED",
            Self::Blueprint { .. } => "STACKER-BLUEPRINT",
            Self::Hook { .. } => "STACKER-HOOK",
            Self::Config(_) | Self::Yaml(_) | Self::Json(_) => "STACKER-CONFIG",
            Self::Internal(_) => "STACKER-INTERNAL",
            Self::Io(_) => "STACKER-IO",
        }
    }
}

/// Diagnostic metadata attached to configuration errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "STACKER-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when the configuration lacks `namespace` or `stacks`.
#[derive(Debug, Clone, Error)]
#[error("Configuration incomplete: {message}")]
pub struct ConfigStructureError {
    /// What is missing.
    pub message: String,
}

impl ConfigStructureError {
    /// Creates a new structure error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised when two stacks share a name.
#[derive(Debug, Clone, Error)]
#[error("Duplicate stack \"{name}\" found in configuration")]
pub struct DuplicateStackError {
    /// The repeated name.
    pub name: String,
    /// Diagnostic info.
    pub error_info: ErrorInfo,
}

impl DuplicateStackError {
    /// Creates a new duplicate stack error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let info = ErrorInfo::new("STACKER-DUPLICATE", format!("Stack \"{name}\" is declared twice"))
            .with_fix_hint("Stack names must be unique within one configuration.")
            .with_context_entry("stack", name.clone());
        Self {
            name,
            error_info: info,
        }
    }
}

/// Error raised when an output lookup names an undeclared stack.
#[derive(Debug, Clone, Error)]
#[error("Stack \"{from}\" references undeclared stack \"{to}\"")]
pub struct UnknownStackReferenceError {
    /// The stack containing the lookup.
    pub from: String,
    /// The missing target.
    pub to: String,
    /// Diagnostic info.
    pub error_info: ErrorInfo,
}

impl UnknownStackReferenceError {
    /// Creates a new unknown reference error.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        let info = ErrorInfo::new(
            "STACKER-UNKNOWN-REF",
            format!("Output lookup in \"{from}\" targets \"{to}\""),
        )
        .with_fix_hint("Check the stack name used in the ${output Stack::Key} lookup for typos.");
        Self {
            from,
            to,
            error_info: info,
        }
    }
}

/// Error raised when a cycle is detected in the dependency graph.
#[derive(Debug, Clone, Error)]
#[error("Cyclic dependency detected: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stacks forming the cycle, first element repeated at the end.
    pub cycle_path: Vec<String>,
    /// Diagnostic info.
    pub error_info: ErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ErrorInfo::new(
            "STACKER-CYCLE",
            format!("Stacks depend on each other's outputs: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the output lookups in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when an environment lookup cannot be satisfied.
#[derive(Debug, Clone, Error)]
#[error("Environment missing key {key}.")]
pub struct MissingEnvironmentError {
    /// The missing key.
    pub key: String,
}

impl MissingEnvironmentError {
    /// Creates a new missing environment error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Error raised when a required blueprint parameter has no value.
#[derive(Debug, Clone, Error)]
#[error("Variable \"{variable}\" in blueprint \"{stack}\" is missing")]
pub struct MissingVariableError {
    /// The stack name.
    pub stack: String,
    /// The missing variable.
    pub variable: String,
}

impl MissingVariableError {
    /// Creates a new missing variable error.
    #[must_use]
    pub fn new(stack: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            variable: variable.into(),
        }
    }
}

/// Error raised when a completed stack lacks an output that was looked up.
#[derive(Debug, Clone, Error)]
#[error("Stack \"{stack}\" has no output \"{key}\"")]
pub struct MissingOutputError {
    /// The stack that completed.
    pub stack: String,
    /// The output key that was requested.
    pub key: String,
}

impl MissingOutputError {
    /// Creates a new missing output error.
    #[must_use]
    pub fn new(stack: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            key: key.into(),
        }
    }
}

/// Error raised for a malformed `${...}` expression.
#[derive(Debug, Clone, Error)]
#[error("Malformed lookup \"{expression}\" in variable \"{variable}\" of stack \"{stack}\": {message}")]
pub struct LookupSyntaxError {
    /// The stack name.
    pub stack: String,
    /// The variable holding the expression.
    pub variable: String,
    /// The offending expression.
    pub expression: String,
    /// Why it was rejected.
    pub message: String,
}

impl LookupSyntaxError {
    /// Creates a new lookup syntax error.
    #[must_use]
    pub fn new(
        stack: impl Into<String>,
        variable: impl Into<String>,
        expression: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stack: stack.into(),
            variable: variable.into(),
            expression: expression.into(),
            message: message.into(),
        }
    }
}

/// Errors reported by a provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The stack does not exist remotely.
    #[error("Stack {stack} does not exist")]
    StackDoesNotExist {
        /// The fully qualified stack name.
        stack: String,
    },

    /// A provider call did not return in time.
    #[error("Provider {operation} for {stack} timed out after {timeout_seconds}s")]
    Timeout {
        /// The fully qualified stack name.
        stack: String,
        /// The operation (describe, create, ...).
        operation: String,
        /// The timeout in seconds.
        timeout_seconds: f64,
    },

    /// A provider call failed.
    #[error("Provider {operation} for {stack} failed: {reason}")]
    Failed {
        /// The fully qualified stack name.
        stack: String,
        /// The operation (describe, create, ...).
        operation: String,
        /// The reason for failure.
        reason: String,
    },
}

impl ProviderError {
    /// Creates a does-not-exist error.
    #[must_use]
    pub fn does_not_exist(stack: impl Into<String>) -> Self {
        Self::StackDoesNotExist {
            stack: stack.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(stack: impl Into<String>, operation: impl Into<String>, timeout_seconds: f64) -> Self {
        Self::Timeout {
            stack: stack.into(),
            operation: operation.into(),
            timeout_seconds,
        }
    }

    /// Creates a failure error.
    #[must_use]
    pub fn failed(
        stack: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Failed {
            stack: stack.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when a confirmation-gated change was not approved.
#[derive(Debug, Clone, Error)]
#[error("Change to {stack} was not confirmed: {reason}")]
pub struct ConfirmationDeclinedError {
    /// The fully qualified stack name.
    pub stack: String,
    /// Why the change was not applied.
    pub reason: String,
}

impl ConfirmationDeclinedError {
    /// Creates a new declined error.
    #[must_use]
    pub fn new(stack: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_environment_message() {
        let err = StackerError::from(MissingEnvironmentError::new("vpc_cidr"));
        assert_eq!(err.to_string(), "Environment missing key vpc_cidr.");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_variable_message() {
        let err = StackerError::from(MissingVariableError::new("app", "InstanceType"));
        assert_eq!(
            err.to_string(),
            "Variable \"InstanceType\" in blueprint \"app\" is missing"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> a"));
        assert_eq!(err.error_info.code, "STACKER-CYCLE");
    }

    #[test]
    fn test_duplicate_error_names_stack() {
        let err = DuplicateStackError::new("vpc");
        assert!(err.to_string().contains("\"vpc\""));
        assert_eq!(err.error_info.context.get("stack"), Some(&"vpc".to_string()));
    }

    #[test]
    fn test_error_codes() {
        let err = StackerError::from(ProviderError::failed("ns-vpc", "create", "boom"));
        assert_eq!(err.code(), "STACKER-PROVIDER");
        assert!(!err.is_fatal());

        let err = StackerError::Internal("oops".to_string());
        assert_eq!(err.code(), "STACKER-INTERNAL");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_provider_timeout_message() {
        let err = ProviderError::timeout("ns-vpc", "update", 30.0);
        assert_eq!(
            err.to_string(),
            "Provider update for ns-vpc timed out after 30s"
        );
    }
}
