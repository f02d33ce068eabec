//! Per-run options.

use crate::provider::UpdateStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Options controlling one build, destroy or diff run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Maximum number of stacks processed at once.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Timeout for each provider call, in seconds.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_seconds: f64,
    /// Timeout for each operator confirmation, in seconds.
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_seconds: f64,
    /// Ask the operator before mutating changes.
    #[serde(default)]
    pub interactive: bool,
    /// Stacks whose protection is overridden.
    #[serde(default)]
    pub force_stacks: BTreeSet<String>,
    /// Skip every confirmation (destroy `--force`).
    #[serde(default)]
    pub force_all: bool,
    /// Replace rather than patch modified resources.
    #[serde(default)]
    pub replacements_only: bool,
    /// Directory receiving rendered templates.
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
}

fn default_max_parallel() -> usize {
    8
}

fn default_provider_timeout() -> f64 {
    600.0
}

fn default_confirm_timeout() -> f64 {
    300.0
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            provider_timeout_seconds: default_provider_timeout(),
            confirm_timeout_seconds: default_confirm_timeout(),
            interactive: false,
            force_stacks: BTreeSet::new(),
            force_all: false,
            replacements_only: false,
            dump_dir: None,
        }
    }
}

impl RunOptions {
    /// Creates options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency bound. Zero is treated as one.
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Sets the provider call timeout.
    #[must_use]
    pub fn with_provider_timeout(mut self, seconds: f64) -> Self {
        self.provider_timeout_seconds = seconds;
        self
    }

    /// Sets the confirmation timeout.
    #[must_use]
    pub fn with_confirm_timeout(mut self, seconds: f64) -> Self {
        self.confirm_timeout_seconds = seconds;
        self
    }

    /// Enables interactive confirmation.
    #[must_use]
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Forces one stack past its protection.
    #[must_use]
    pub fn with_forced_stack(mut self, name: impl Into<String>) -> Self {
        self.force_stacks.insert(name.into());
        self
    }

    /// Skips every confirmation.
    #[must_use]
    pub fn with_force_all(mut self, force_all: bool) -> Self {
        self.force_all = force_all;
        self
    }

    /// Selects the replacements-only update strategy.
    #[must_use]
    pub fn with_replacements_only(mut self, replacements_only: bool) -> Self {
        self.replacements_only = replacements_only;
        self
    }

    /// Dumps rendered templates to a directory.
    #[must_use]
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Returns the provider timeout.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.provider_timeout_seconds.max(0.0))
    }

    /// Returns the confirmation timeout.
    #[must_use]
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.confirm_timeout_seconds.max(0.0))
    }

    /// Returns the effective concurrency bound.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.max_parallel.max(1)
    }

    /// Returns the update strategy.
    #[must_use]
    pub fn update_strategy(&self) -> UpdateStrategy {
        if self.replacements_only {
            UpdateStrategy::ReplacementsOnly
        } else {
            UpdateStrategy::Default
        }
    }

    /// Whether a stack skips confirmation, by name.
    #[must_use]
    pub fn is_forced(&self, stack: &str) -> bool {
        self.force_all || self.force_stacks.contains(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RunOptions::default();
        assert_eq!(options.max_parallel, 8);
        assert_eq!(options.provider_timeout(), Duration::from_secs(600));
        assert_eq!(options.update_strategy(), UpdateStrategy::Default);
        assert!(!options.is_forced("db"));
    }

    #[test]
    fn test_builders() {
        let options = RunOptions::new()
            .with_max_parallel(0)
            .with_forced_stack("db")
            .with_replacements_only(true)
            .with_provider_timeout(1.5);

        assert_eq!(options.parallelism(), 1);
        assert!(options.is_forced("db"));
        assert!(!options.is_forced("vpc"));
        assert_eq!(options.update_strategy(), UpdateStrategy::ReplacementsOnly);
        assert_eq!(options.provider_timeout(), Duration::from_millis(1500));
        assert!(RunOptions::new().with_force_all(true).is_forced("anything"));
    }

    #[test]
    fn test_deserialize_partial() {
        let options: RunOptions = serde_json::from_str(r#"{"interactive": true}"#).unwrap();
        assert!(options.interactive);
        assert_eq!(options.confirm_timeout_seconds, 300.0);
    }
}
