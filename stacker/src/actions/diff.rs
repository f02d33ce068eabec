//! Report planned changes for one stack without mutating anything.

use super::{ActionKind, StackAction, StackOutcome};
use crate::blueprint::build_parameters;
use crate::context::RunContext;
use crate::core::{reason, Stack, StackStatus};
use crate::errors::StackerError;
use crate::lookup::ResolveMode;
use crate::provider::{StackDiff, StackRequest};
use async_trait::async_trait;
use tracing::debug;

/// Computes the diff a build would apply.
///
/// Outputs of stacks that do not exist yet resolve to placeholders. Existing
/// stacks publish their current outputs so dependents can be diffed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffAction;

#[async_trait]
impl StackAction for DiffAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Diff
    }

    async fn execute(&self, ctx: &RunContext, stack: &Stack) -> Result<StackOutcome, StackerError> {
        if !stack.enabled() {
            super::publish_existing_outputs(ctx, stack).await?;
            return Ok(StackOutcome::new(StackStatus::skipped(reason::DISABLED)));
        }

        let variables = ctx.resolver(ResolveMode::Preview).resolve(stack)?;
        let blueprint = ctx.blueprints().render(stack, &variables).await?;
        let existing = ctx
            .provider_call(stack, "describe", ctx.provider().describe(stack.fqn()))
            .await?;
        let parameters = build_parameters(stack, &blueprint, &variables, existing.as_ref())?;
        let request = StackRequest::new(stack.fqn(), blueprint.template, parameters, ctx.tags().clone());

        let Some(current) = existing else {
            return Ok(StackOutcome::new(StackStatus::complete(reason::WOULD_CREATE))
                .with_diff(StackDiff::creation(&request)));
        };

        ctx.outputs().commit(stack.name(), current.output_map())?;
        let diff = ctx
            .provider()
            .diff(&current, &request)
            .with_strategy(ctx.options().update_strategy());
        debug!(stack = %stack.fqn(), changes = diff.len(), "Computed diff");

        let status = if diff.is_empty() {
            StackStatus::skipped(reason::NO_CHANGE)
        } else {
            StackStatus::complete(reason::WOULD_UPDATE)
        };
        Ok(StackOutcome::new(status).with_diff(diff))
    }
}
