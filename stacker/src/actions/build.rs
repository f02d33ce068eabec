//! Create or update one stack.

use super::{ActionKind, StackAction, StackOutcome};
use crate::blueprint::build_parameters;
use crate::confirm::ConfirmationRequest;
use crate::context::RunContext;
use crate::core::{reason, Stack, StackStatus};
use crate::errors::{ConfirmationDeclinedError, StackerError};
use crate::lookup::ResolveMode;
use crate::provider::{StackDiff, StackRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{info, warn};

/// Builds a stack: create if absent, update if changed, skip otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildAction;

impl BuildAction {
    /// Decides whether an update may go ahead.
    ///
    /// Forced stacks always may. Protected stacks, and every stack in
    /// interactive mode, need an explicit yes.
    async fn authorize(
        ctx: &RunContext,
        stack: &Stack,
        diff: &StackDiff,
    ) -> Result<(), StackerError> {
        let options = ctx.options();
        if options.is_forced(stack.name()) || options.is_forced(stack.fqn()) {
            return Ok(());
        }
        if !stack.protected() && !options.interactive {
            return Ok(());
        }
        if !options.interactive {
            warn!(stack = %stack.fqn(), "Refusing to update protected stack");
            return Err(ConfirmationDeclinedError::new(
                stack.fqn(),
                "stack is protected; rerun interactively or with --force",
            )
            .into());
        }

        let Some(gate) = ctx.confirmation_gate() else {
            return Err(ConfirmationDeclinedError::new(stack.fqn(), "no confirmer available").into());
        };
        let request = ConfirmationRequest::new(stack.fqn(), "update")
            .with_summary(diff.lines())
            .with_protected(stack.protected());
        gate.authorize(&request).await?;
        Ok(())
    }

    async fn publish(ctx: &RunContext, stack: &Stack) -> Result<(), StackerError> {
        let outputs = ctx
            .provider_call(stack, "outputs", ctx.provider().outputs(stack.fqn()))
            .await?;
        ctx.outputs().commit(stack.name(), outputs)
    }
}

#[async_trait]
impl StackAction for BuildAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Build
    }

    async fn execute(&self, ctx: &RunContext, stack: &Stack) -> Result<StackOutcome, StackerError> {
        if !stack.enabled() {
            info!(stack = %stack.fqn(), "Stack is disabled");
            if !super::publish_existing_outputs(ctx, stack).await? {
                ctx.outputs().commit(stack.name(), HashMap::new())?;
            }
            return Ok(StackOutcome::new(StackStatus::skipped(reason::DISABLED)));
        }

        let variables = ctx.resolver(ResolveMode::Strict).resolve(stack)?;
        let blueprint = ctx.blueprints().render(stack, &variables).await?;
        let existing = ctx
            .provider_call(stack, "describe", ctx.provider().describe(stack.fqn()))
            .await?;
        let parameters = build_parameters(stack, &blueprint, &variables, existing.as_ref())?;
        let request = StackRequest::new(stack.fqn(), blueprint.template, parameters, ctx.tags().clone());

        ctx.dump(&request)
            .await
            .map_err(|e| StackerError::blueprint(stack.name(), format!("cannot dump template: {e}")))?;

        let outcome = match existing {
            None => {
                ctx.report(stack, StackStatus::submitted(reason::CREATING)).await;
                ctx.provider_call(stack, "create", ctx.provider().create(&request))
                    .await?;
                StackOutcome::new(StackStatus::complete(reason::CREATING))
                    .with_diff(StackDiff::creation(&request))
            }
            Some(current) => {
                let strategy = ctx.options().update_strategy();
                let diff = ctx.provider().diff(&current, &request).with_strategy(strategy);
                if diff.is_empty() {
                    StackOutcome::new(StackStatus::skipped(reason::NO_CHANGE))
                } else {
                    Self::authorize(ctx, stack, &diff).await?;
                    ctx.report(stack, StackStatus::submitted(reason::UPDATING)).await;
                    ctx.provider_call(stack, "update", ctx.provider().update(&request, strategy))
                        .await?;
                    StackOutcome::new(StackStatus::complete(reason::UPDATING)).with_diff(diff)
                }
            }
        };

        Self::publish(ctx, stack).await?;
        Ok(outcome)
    }
}
