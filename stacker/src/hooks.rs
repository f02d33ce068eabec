//! Build hooks.
//!
//! `pre_build` hooks run before the first stack is dispatched and
//! `post_build` hooks after every stack succeeded. Neither runs for outline
//! or template dump runs. A failing required hook aborts the build; an
//! optional one is logged and skipped.

use crate::errors::StackerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info, warn};

/// Environment variable carrying the hook stage.
pub const HOOK_STAGE_ENV: &str = "STACKER_HOOK_STAGE";

/// Environment variable carrying the hook arguments as a JSON object.
pub const HOOK_ARGS_ENV: &str = "STACKER_HOOK_ARGS";

/// When a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    /// Before any stack is dispatched.
    PreBuild,
    /// After every stack succeeded.
    PostBuild,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreBuild => write!(f, "pre_build"),
            Self::PostBuild => write!(f, "post_build"),
        }
    }
}

/// One configured hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookDefinition {
    /// What to run. For [`CommandHookRunner`], a program path.
    pub path: String,
    /// Whether a failure aborts the build.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Disabled hooks are skipped.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Arguments handed to the hook.
    #[serde(default)]
    pub args: BTreeMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl HookDefinition {
    /// Creates a required, enabled hook without arguments.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            required: true,
            enabled: true,
            args: BTreeMap::new(),
        }
    }

    /// Lets the build continue when this hook fails.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Disables the hook.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Adds an argument.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }
}

/// The hooks of one configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildHooks {
    /// Hooks run before the build.
    pub pre_build: Vec<HookDefinition>,
    /// Hooks run after a successful build.
    pub post_build: Vec<HookDefinition>,
}

impl BuildHooks {
    /// Returns the hooks of a stage.
    #[must_use]
    pub fn stage(&self, stage: HookStage) -> &[HookDefinition] {
        match stage {
            HookStage::PreBuild => &self.pre_build,
            HookStage::PostBuild => &self.post_build,
        }
    }

    /// Returns true if no hook is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pre_build.is_empty() && self.post_build.is_empty()
    }
}

/// Executes a single hook.
///
/// `Ok(false)` means the hook ran and reported failure; `Err` means it
/// could not be run at all. Both count as failures.
#[async_trait]
pub trait HookRunner: Send + Sync + fmt::Debug {
    /// Runs `hook` for `stage`.
    async fn run(&self, stage: HookStage, hook: &HookDefinition) -> Result<bool, String>;
}

/// Runs hooks as external programs.
///
/// Relative program paths are resolved against the root directory, which
/// is also the working directory. The stage and the JSON-encoded arguments
/// are passed in [`HOOK_STAGE_ENV`] and [`HOOK_ARGS_ENV`]. A zero exit
/// status is success.
#[derive(Debug, Clone)]
pub struct CommandHookRunner {
    root: PathBuf,
}

impl CommandHookRunner {
    /// Creates a runner rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the program to execute for a hook.
    #[must_use]
    pub fn program(&self, hook: &HookDefinition) -> PathBuf {
        let path = Path::new(&hook.path);
        if path.is_relative() && path.components().count() > 1 {
            self.root.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

impl Default for CommandHookRunner {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Environment passed to a hook program.
pub fn hook_env(stage: HookStage, hook: &HookDefinition) -> Result<Vec<(String, String)>, String> {
    let args = serde_json::to_string(&hook.args).map_err(|e| e.to_string())?;
    Ok(vec![
        (HOOK_STAGE_ENV.to_string(), stage.to_string()),
        (HOOK_ARGS_ENV.to_string(), args),
    ])
}

#[async_trait]
impl HookRunner for CommandHookRunner {
    async fn run(&self, stage: HookStage, hook: &HookDefinition) -> Result<bool, String> {
        let program = self.program(hook);
        let status = tokio::process::Command::new(&program)
            .current_dir(&self.root)
            .envs(hook_env(stage, hook)?)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| format!("cannot run {}: {e}", program.display()))?;

        debug!(hook = %hook.path, %stage, status = %status, "Hook exited");
        Ok(status.success())
    }
}

/// Runs the enabled hooks of a stage in order.
///
/// # Errors
///
/// Returns `StackerError::Hook` for the first required hook that fails.
pub async fn run_hooks(
    stage: HookStage,
    hooks: &[HookDefinition],
    runner: &dyn HookRunner,
) -> Result<(), StackerError> {
    for hook in hooks {
        if !hook.enabled {
            debug!(hook = %hook.path, %stage, "Hook disabled, skipping");
            continue;
        }

        info!(hook = %hook.path, %stage, "Running hook");
        let message = match runner.run(stage, hook).await {
            Ok(true) => continue,
            Ok(false) => "hook reported failure".to_string(),
            Err(message) => message,
        };

        if hook.required {
            return Err(StackerError::hook(stage.to_string(), hook.path.as_str(), message));
        }
        warn!(hook = %hook.path, %stage, error = %message, "Optional hook failed, continuing");
    }
    Ok(())
}
