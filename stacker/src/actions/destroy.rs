//! Tear down one stack.

use super::{ActionKind, StackAction, StackOutcome};
use crate::confirm::ConfirmationRequest;
use crate::context::RunContext;
use crate::core::{reason, Stack, StackStatus};
use crate::errors::{ConfirmationDeclinedError, StackerError};
use async_trait::async_trait;
use tracing::info;

/// Destroys a stack. Runs in reverse dependency order.
///
/// Without `force_all` every stack needs an interactive yes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DestroyAction;

impl DestroyAction {
    async fn authorize(ctx: &RunContext, stack: &Stack) -> Result<(), StackerError> {
        if ctx.options().force_all {
            return Ok(());
        }
        let gate = match ctx.confirmation_gate() {
            Some(gate) if ctx.options().interactive => gate,
            _ => {
                return Err(ConfirmationDeclinedError::new(
                    stack.fqn(),
                    "destroy requires --force or interactive confirmation",
                )
                .into())
            }
        };
        let request = ConfirmationRequest::new(stack.fqn(), "destroy")
            .with_summary(vec![format!("- {}", stack.fqn())])
            .with_protected(stack.protected());
        gate.authorize(&request).await?;
        Ok(())
    }
}

#[async_trait]
impl StackAction for DestroyAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Destroy
    }

    async fn execute(&self, ctx: &RunContext, stack: &Stack) -> Result<StackOutcome, StackerError> {
        let existing = ctx
            .provider_call(stack, "describe", ctx.provider().describe(stack.fqn()))
            .await?;
        if existing.is_none() {
            info!(stack = %stack.fqn(), "Nothing to destroy");
            return Ok(StackOutcome::new(StackStatus::skipped(reason::DOES_NOT_EXIST)));
        }

        Self::authorize(ctx, stack).await?;
        ctx.report(stack, StackStatus::submitted(reason::SUBMITTED_FOR_DESTRUCTION))
            .await;
        ctx.provider_call(stack, "destroy", ctx.provider().destroy(stack.fqn()))
            .await?;
        Ok(StackOutcome::new(StackStatus::complete(reason::DESTROYED)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackDefinition;
    use crate::events::CollectingEventSink;
    use crate::options::RunOptions;
    use crate::provider::{Provider, RemoteStack, StackRequest};
    use crate::testing::{FakeProvider, ScriptedConfirmer, StaticBlueprints};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn provider_with_vpc() -> Arc<FakeProvider> {
        let request = StackRequest::new("ns-vpc", json!({}), BTreeMap::new(), BTreeMap::new());
        Arc::new(FakeProvider::new().with_stack(RemoteStack::from_request(&request)))
    }

    fn vpc() -> Stack {
        Stack::new("ns", StackDefinition::new("vpc", "vpc"))
    }

    #[tokio::test]
    async fn test_forced_destroy() {
        let provider = provider_with_vpc();
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = RunContext::new(provider.clone(), Arc::new(StaticBlueprints::new()))
            .with_sink(sink.clone())
            .with_options(RunOptions::new().with_force_all(true));

        let outcome = DestroyAction.execute(&ctx, &vpc()).await.unwrap();
        assert_eq!(outcome.status, StackStatus::complete(reason::DESTROYED));
        assert_eq!(sink.lines(), vec!["ns-vpc: submitted (submitted for destruction)"]);
        assert!(provider.describe("ns-vpc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_absent_stack_skipped() {
        let provider = Arc::new(FakeProvider::new());
        let ctx = RunContext::new(provider.clone(), Arc::new(StaticBlueprints::new()))
            .with_options(RunOptions::new().with_force_all(true));

        let outcome = DestroyAction.execute(&ctx, &vpc()).await.unwrap();
        assert_eq!(outcome.status, StackStatus::skipped(reason::DOES_NOT_EXIST));
        assert!(provider.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unforced_destroy_needs_confirmation() {
        let provider = provider_with_vpc();
        let ctx = RunContext::new(provider.clone(), Arc::new(StaticBlueprints::new()));

        let err = DestroyAction.execute(&ctx, &vpc()).await.unwrap_err();
        assert!(matches!(err, StackerError::ConfirmationDeclined(_)));

        let confirmer = Arc::new(ScriptedConfirmer::always(true));
        let interactive = ctx
            .with_options(RunOptions::new().with_interactive(true))
            .with_confirmer(confirmer.clone());
        let outcome = DestroyAction.execute(&interactive, &vpc()).await.unwrap();

        assert_eq!(outcome.status, StackStatus::complete(reason::DESTROYED));
        assert_eq!(confirmer.asked(), vec!["ns-vpc".to_string()]);
    }
}
