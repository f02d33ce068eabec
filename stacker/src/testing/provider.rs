//! In-memory provider.

use crate::errors::ProviderError;
use crate::provider::{Provider, RemoteStack, StackRequest, UpdateStrategy};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    /// `describe`, `create`, `update` or `destroy`.
    pub operation: String,
    /// Fully qualified stack name.
    pub stack: String,
    /// Strategy passed to `update`.
    pub strategy: Option<UpdateStrategy>,
}

impl ProviderCall {
    /// Whether the call changes state.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(self.operation.as_str(), "create" | "update" | "destroy")
    }
}

/// A provider keeping stacks in memory.
#[derive(Debug, Default)]
pub struct FakeProvider {
    stacks: Mutex<BTreeMap<String, RemoteStack>>,
    calls: Mutex<Vec<ProviderCall>>,
    failures: HashSet<(String, String)>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the in-flight counter when a call ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an existing stack.
    #[must_use]
    pub fn with_stack(self, stack: RemoteStack) -> Self {
        self.stacks.lock().insert(stack.fqn.clone(), stack);
        self
    }

    /// Makes one operation on one stack fail.
    #[must_use]
    pub fn fail_on(mut self, stack: impl Into<String>, operation: impl Into<String>) -> Self {
        self.failures.insert((stack.into(), operation.into()));
        self
    }

    /// Makes every call take at least `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    /// Returns the recorded create, update and destroy calls.
    #[must_use]
    pub fn mutating_calls(&self) -> Vec<ProviderCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    /// Returns the stacks touched by one operation, in call order.
    #[must_use]
    pub fn calls_of(&self, operation: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.stack.clone())
            .collect()
    }

    /// Returns the stacks created, in order.
    #[must_use]
    pub fn created(&self) -> Vec<String> {
        self.calls_of("create")
    }

    /// Returns the stacks updated, in order.
    #[must_use]
    pub fn updated(&self) -> Vec<String> {
        self.calls_of("update")
    }

    /// Returns the stacks destroyed, in order.
    #[must_use]
    pub fn destroyed(&self) -> Vec<String> {
        self.calls_of("destroy")
    }

    /// Returns a stored stack.
    #[must_use]
    pub fn stack(&self, fqn: &str) -> Option<RemoteStack> {
        self.stacks.lock().get(fqn).cloned()
    }

    /// Returns the names of stored stacks.
    #[must_use]
    pub fn stack_names(&self) -> Vec<String> {
        self.stacks.lock().keys().cloned().collect()
    }

    /// Returns the highest number of calls ever in flight at once.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    async fn enter(
        &self,
        operation: &str,
        stack: &str,
        strategy: Option<UpdateStrategy>,
    ) -> Result<InFlight<'_>, ProviderError> {
        self.calls.lock().push(ProviderCall {
            operation: operation.to_string(),
            stack: stack.to_string(),
            strategy,
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failures
            .contains(&(stack.to_string(), operation.to_string()))
        {
            return Err(ProviderError::failed(stack, operation, "injected failure"));
        }
        Ok(guard)
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn describe(&self, fqn: &str) -> Result<Option<RemoteStack>, ProviderError> {
        let _guard = self.enter("describe", fqn, None).await?;
        Ok(self.stack(fqn))
    }

    async fn create(&self, request: &StackRequest) -> Result<RemoteStack, ProviderError> {
        let _guard = self.enter("create", &request.fqn, None).await?;
        let mut stacks = self.stacks.lock();
        if stacks.contains_key(&request.fqn) {
            return Err(ProviderError::failed(
                request.fqn.as_str(),
                "create",
                "stack already exists",
            ));
        }
        let stack = RemoteStack::from_request(request);
        stacks.insert(request.fqn.clone(), stack.clone());
        Ok(stack)
    }

    async fn update(
        &self,
        request: &StackRequest,
        strategy: UpdateStrategy,
    ) -> Result<RemoteStack, ProviderError> {
        let _guard = self.enter("update", &request.fqn, Some(strategy)).await?;
        let mut stacks = self.stacks.lock();
        if !stacks.contains_key(&request.fqn) {
            return Err(ProviderError::does_not_exist(request.fqn.as_str()));
        }
        let stack = RemoteStack::from_request(request);
        stacks.insert(request.fqn.clone(), stack.clone());
        Ok(stack)
    }

    async fn destroy(&self, fqn: &str) -> Result<(), ProviderError> {
        let _guard = self.enter("destroy", fqn, None).await?;
        self.stacks
            .lock()
            .remove(fqn)
            .map(|_| ())
            .ok_or_else(|| ProviderError::does_not_exist(fqn))
    }

    async fn outputs(
        &self,
        fqn: &str,
    ) -> Result<std::collections::HashMap<String, serde_json::Value>, ProviderError> {
        let _guard = self.enter("outputs", fqn, None).await?;
        self.stack(fqn)
            .map(|stack| stack.output_map())
            .ok_or_else(|| ProviderError::does_not_exist(fqn))
    }
}
