//! Run-scoped collaborators shared by every stack action.

use crate::blueprint::BlueprintSource;
use crate::cancellation::CancellationToken;
use crate::config::{Config, Environment};
use crate::confirm::{ConfirmationGate, Confirmer};
use crate::core::{Stack, StackStatus, StatusEvent};
use crate::errors::{ProviderError, StackerError};
use crate::events::{EventSink, NoOpEventSink};
use crate::hooks::{CommandHookRunner, HookRunner};
use crate::lookup::{ResolveMode, VariableResolver};
use crate::options::RunOptions;
use crate::outputs::OutputStore;
use crate::provider::{Provider, StackRequest};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything a stack action needs besides the stack itself.
///
/// One context serves one run. Its output store starts empty.
#[derive(Clone)]
pub struct RunContext {
    run_id: Uuid,
    namespace: String,
    tags: BTreeMap<String, String>,
    provider: Arc<dyn Provider>,
    blueprints: Arc<dyn BlueprintSource>,
    environment: Environment,
    outputs: Arc<OutputStore>,
    sink: Arc<dyn EventSink>,
    confirmer: Option<Arc<dyn Confirmer>>,
    hook_runner: Arc<dyn HookRunner>,
    options: RunOptions,
    cancellation: Arc<CancellationToken>,
}

impl RunContext {
    /// Creates a context with an empty environment and no confirmer.
    ///
    /// Build hooks run as programs relative to the working directory.
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>, blueprints: Arc<dyn BlueprintSource>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            namespace: String::new(),
            tags: BTreeMap::new(),
            provider,
            blueprints,
            environment: Environment::new(),
            outputs: Arc::new(OutputStore::new()),
            sink: Arc::new(NoOpEventSink),
            confirmer: None,
            hook_runner: Arc::new(CommandHookRunner::default()),
            options: RunOptions::default(),
            cancellation: Arc::new(CancellationToken::new()),
        }
    }

    /// Takes namespace and tags from a configuration.
    #[must_use]
    pub fn with_config(mut self, config: &Config) -> Self {
        self.namespace = config.namespace.clone();
        self.tags = config.tags.clone();
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the confirmer used in interactive mode.
    #[must_use]
    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = Some(confirmer);
        self
    }

    /// Sets the runner for build hooks.
    #[must_use]
    pub fn with_hook_runner(mut self, runner: Arc<dyn HookRunner>) -> Self {
        self.hook_runner = runner;
        self
    }

    /// Sets the run options.
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Shares a cancellation token with the caller.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Replaces the output store.
    #[must_use]
    pub fn with_outputs(mut self, outputs: Arc<OutputStore>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the tags applied to created and updated stacks.
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Returns the provider.
    #[must_use]
    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Returns the blueprint source.
    #[must_use]
    pub fn blueprints(&self) -> &dyn BlueprintSource {
        self.blueprints.as_ref()
    }

    /// Returns the environment.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Returns the output store.
    #[must_use]
    pub fn outputs(&self) -> &OutputStore {
        &self.outputs
    }

    /// Returns the build hook runner.
    #[must_use]
    pub fn hook_runner(&self) -> &dyn HookRunner {
        self.hook_runner.as_ref()
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// Returns a resolver over this run's environment and outputs.
    #[must_use]
    pub fn resolver(&self, mode: ResolveMode) -> VariableResolver<'_> {
        VariableResolver::new(&self.environment, &self.outputs).with_mode(mode)
    }

    /// Returns the confirmation gate when one is configured.
    #[must_use]
    pub fn confirmation_gate(&self) -> Option<ConfirmationGate> {
        self.confirmer
            .as_ref()
            .map(|confirmer| ConfirmationGate::new(confirmer.clone(), self.options.confirm_timeout()))
    }

    /// Emits a status transition.
    pub async fn report(&self, stack: &Stack, status: StackStatus) {
        debug!(stack = %stack.fqn(), status = %status, "Status transition");
        self.sink
            .emit(&StatusEvent::new(self.run_id, stack.fqn(), status))
            .await;
    }

    /// Runs a provider call under the provider timeout.
    ///
    /// # Errors
    ///
    /// Returns the call's own error, or `ProviderError::Timeout`.
    pub async fn provider_call<T, F>(
        &self,
        stack: &Stack,
        operation: &str,
        call: F,
    ) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>> + Send,
    {
        let timeout = self.options.provider_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(
                stack.fqn(),
                operation,
                timeout.as_secs_f64(),
            )),
        }
    }

    /// Writes a rendered request to the dump directory, if one is set.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Json` when the file cannot be written.
    pub async fn dump(&self, request: &StackRequest) -> Result<Option<PathBuf>, StackerError> {
        let Some(dir) = &self.options.dump_dir else {
            return Ok(None);
        };
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.json", request.fqn));
        let body = serde_json::to_vec_pretty(request)?;
        tokio::fs::write(&path, body).await?;
        info!(stack = %request.fqn, path = %path.display(), "Dumped template");
        Ok(Some(path))
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("namespace", &self.namespace)
            .field("provider", &self.provider.name())
            .field("interactive", &self.options.interactive)
            .field("outputs", &self.outputs.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackDefinition;
    use crate::events::CollectingEventSink;
    use crate::testing::{FakeProvider, StaticBlueprints};
    use serde_json::json;
    use std::time::Duration;

    fn context() -> RunContext {
        RunContext::new(Arc::new(FakeProvider::new()), Arc::new(StaticBlueprints::new()))
    }

    #[tokio::test]
    async fn test_report_emits_line() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = context().with_sink(sink.clone());
        let stack = Stack::new("ns", StackDefinition::new("vpc", "vpc"));

        ctx.report(&stack, StackStatus::Pending).await;
        assert_eq!(sink.lines(), vec!["ns-vpc: pending"]);
        assert_eq!(sink.events()[0].run_id, ctx.run_id());
    }

    #[tokio::test]
    async fn test_provider_call_timeout() {
        let ctx = context().with_options(RunOptions::new().with_provider_timeout(0.01));
        let stack = Stack::new("ns", StackDefinition::new("vpc", "vpc"));

        let err = ctx
            .provider_call(&stack, "describe", async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, ProviderError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_dump_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context().with_options(RunOptions::new().with_dump_dir(dir.path()));
        let request = StackRequest::new("ns-vpc", json!({"Resources": {}}), BTreeMap::new(), BTreeMap::new());

        let path = ctx.dump(&request).await.unwrap().unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["fqn"], json!("ns-vpc"));

        assert!(context().dump(&request).await.unwrap().is_none());
    }
}
