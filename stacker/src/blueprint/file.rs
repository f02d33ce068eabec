//! Blueprints loaded from template files.

use super::{Blueprint, BlueprintSource};
use crate::core::Stack;
use crate::errors::StackerError;
use crate::lookup::ResolvedVariables;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads templates from disk, relative to a root directory.
///
/// A stack's class path is the template file. `.json` files are parsed as
/// JSON; `.yaml` and `.yml` as YAML.
#[derive(Debug, Clone)]
pub struct FileBlueprints {
    root: PathBuf,
}

impl FileBlueprints {
    /// Creates a source resolving class paths against `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn parse(stack: &Stack, path: &Path, text: &str) -> Result<serde_json::Value, StackerError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => serde_json::from_str(text)
                .map_err(|e| StackerError::blueprint(stack.name(), format!("invalid JSON template: {e}"))),
            Some("yaml" | "yml") => serde_yaml::from_str(text)
                .map_err(|e| StackerError::blueprint(stack.name(), format!("invalid YAML template: {e}"))),
            _ => Err(StackerError::blueprint(
                stack.name(),
                format!("unsupported template type: {}", path.display()),
            )),
        }
    }
}

#[async_trait]
impl BlueprintSource for FileBlueprints {
    async fn render(
        &self,
        stack: &Stack,
        _variables: &ResolvedVariables,
    ) -> Result<Blueprint, StackerError> {
        let path = self.root.join(stack.class_path());
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            StackerError::blueprint(stack.name(), format!("cannot read {}: {e}", path.display()))
        })?;
        let template = Self::parse(stack, &path, &text)?;
        debug!(stack = %stack.fqn(), template = %path.display(), "Loaded blueprint");
        Ok(Blueprint::from_template(stack.name(), template))
    }
}
