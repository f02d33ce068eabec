//! Concurrent, dependency-ordered execution of stack actions.
//!
//! Stacks become ready when everything they wait on (dependencies for build
//! and diff, dependents for destroy) finished successfully. Ready stacks run
//! concurrently up to `max_parallel`, dispatched in topological order. A
//! failed stack blocks everything that transitively waits on it; unrelated
//! branches keep going.

mod report;

pub use report::{RunReport, StackReport};

use crate::actions::{ActionKind, StackOutcome};
use crate::config::Config;
use crate::context::RunContext;
use crate::core::StackStatus;
use crate::errors::StackerError;
use crate::graph::{Direction, StackGraph};
use crate::hooks::{run_hooks, BuildHooks, HookStage};
use crate::lookup::verify_environment;
use crate::provider::StackDiff;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Runs build, destroy and diff over a stack graph.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    graph: Arc<StackGraph>,
    context: Arc<RunContext>,
    hooks: Arc<BuildHooks>,
}

/// Per-run bookkeeping owned by the scheduling loop.
struct RunState {
    direction: Direction,
    statuses: Vec<StackStatus>,
    diffs: Vec<Option<StackDiff>>,
    waiting_on: Vec<usize>,
    rank: Vec<usize>,
    ready: BTreeSet<(usize, usize)>,
}

impl RunState {
    fn new(graph: &StackGraph, direction: Direction) -> Self {
        let order = graph.order(direction);
        let mut rank = vec![0; graph.len()];
        for (position, &index) in order.iter().enumerate() {
            rank[index] = position;
        }
        let waiting_on: Vec<usize> = (0..graph.len())
            .map(|index| graph.prerequisites(index, direction).len())
            .collect();
        let ready = order
            .iter()
            .filter(|&&index| waiting_on[index] == 0)
            .map(|&index| (rank[index], index))
            .collect();

        Self {
            direction,
            statuses: vec![StackStatus::Pending; graph.len()],
            diffs: vec![None; graph.len()],
            waiting_on,
            rank,
            ready,
        }
    }

    fn next_ready(&mut self) -> Option<usize> {
        self.ready.pop_first().map(|(_, index)| index)
    }

    /// Releases followers of a successful stack.
    fn release(&mut self, graph: &StackGraph, index: usize) {
        for &follower in graph.followers(index, self.direction) {
            self.waiting_on[follower] = self.waiting_on[follower].saturating_sub(1);
            if self.waiting_on[follower] == 0 && self.statuses[follower] == StackStatus::Pending {
                self.ready.insert((self.rank[follower], follower));
            }
        }
    }

    /// Marks everything waiting on a failed stack as blocked.
    fn block(&mut self, graph: &StackGraph, index: usize) -> Vec<usize> {
        let culprit = graph.stack(index).fqn().to_string();
        let mut blocked = Vec::new();
        for follower in graph.transitive_followers(index, self.direction) {
            if self.statuses[follower] == StackStatus::Pending {
                self.statuses[follower] = StackStatus::Blocked(culprit.clone());
                self.ready.remove(&(self.rank[follower], follower));
                blocked.push(follower);
            }
        }
        blocked.sort_by_key(|&i| self.rank[i]);
        blocked
    }
}

impl Orchestrator {
    /// Creates an orchestrator over a built graph.
    #[must_use]
    pub fn new(graph: StackGraph, context: RunContext) -> Self {
        Self {
            graph: Arc::new(graph),
            context: Arc::new(context),
            hooks: Arc::new(BuildHooks::default()),
        }
    }

    /// Builds the graph from a configuration and binds the context to it.
    /// The configuration's build hooks come along.
    ///
    /// # Errors
    ///
    /// Returns the structural errors of [`StackGraph::build`].
    pub fn from_config(config: &Config, context: RunContext) -> Result<Self, StackerError> {
        let graph = StackGraph::build(config)?;
        Ok(Self::new(graph, context.with_config(config)).with_hooks(config.hooks()))
    }

    /// Sets the build hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: BuildHooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Returns the graph.
    #[must_use]
    pub fn graph(&self) -> &StackGraph {
        &self.graph
    }

    /// Returns the run context.
    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Renders the plan for an action without running it.
    #[must_use]
    pub fn outline(&self, kind: ActionKind) -> String {
        self.graph.outline(kind.direction())
    }

    /// Creates or updates every stack.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::execute`].
    pub async fn build(&self) -> Result<RunReport, StackerError> {
        self.execute(ActionKind::Build).await
    }

    /// Destroys every stack in reverse order.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::execute`].
    pub async fn destroy(&self) -> Result<RunReport, StackerError> {
        self.execute(ActionKind::Destroy).await
    }

    /// Reports planned changes without mutating anything.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::execute`].
    pub async fn diff(&self) -> Result<RunReport, StackerError> {
        self.execute(ActionKind::Diff).await
    }

    /// Runs an action over the whole graph.
    ///
    /// Stack-local failures end up in the report. Missing environment keys
    /// abort before any provider call. Fatal errors raised by a stack stop
    /// further dispatch; in-flight stacks finish before the error returns.
    ///
    /// Builds run `pre_build` hooks before dispatch and `post_build` hooks
    /// once every stack succeeded, except when templates are being dumped.
    ///
    /// # Errors
    ///
    /// Returns `MissingEnvironment` or a failed `pre_build` hook before
    /// dispatch, the first fatal stack error, or a failed `post_build` hook.
    pub async fn execute(&self, kind: ActionKind) -> Result<RunReport, StackerError> {
        let start = Instant::now();
        let ctx = &self.context;
        let graph = &self.graph;

        verify_environment(graph.stacks(), ctx.environment())?;

        let with_hooks = kind == ActionKind::Build && self.hooks_enabled();
        if with_hooks {
            run_hooks(HookStage::PreBuild, &self.hooks.pre_build, ctx.hook_runner()).await?;
        }

        let direction = kind.direction();
        let order = graph.order(direction);
        let action = kind.action();
        let limit = ctx.options().parallelism();
        let mut state = RunState::new(graph, direction);

        info!(
            run_id = %ctx.run_id(),
            action = %kind,
            stacks = graph.len(),
            max_parallel = limit,
            "Starting run"
        );

        for &index in &order {
            ctx.report(graph.stack(index), StackStatus::Pending).await;
        }

        let mut in_flight = FuturesUnordered::new();
        let mut fatal: Option<StackerError> = None;

        loop {
            let halted = fatal.is_some() || ctx.cancellation().is_cancelled();
            while !halted && in_flight.len() < limit {
                let Some(index) = state.next_ready() else {
                    break;
                };
                info!(stack = %graph.stack(index).fqn(), action = %kind, "Dispatching stack");

                let task_graph = Arc::clone(&self.graph);
                let task_ctx = Arc::clone(&self.context);
                let task_action = Arc::clone(&action);
                let handle = tokio::spawn(async move {
                    task_action.execute(&task_ctx, task_graph.stack(index)).await
                });
                in_flight.push(async move { (index, handle.await) });
            }

            let Some((index, joined)) = in_flight.next().await else {
                break;
            };
            let stack = graph.stack(index);
            let result = joined.unwrap_or_else(|e| {
                Err(StackerError::Internal(format!(
                    "task for stack {} did not finish: {e}",
                    stack.fqn()
                )))
            });

            match result {
                Ok(StackOutcome { status, diff }) => {
                    ctx.report(stack, status.clone()).await;
                    let succeeded = status.is_success();
                    state.statuses[index] = status;
                    state.diffs[index] = diff;
                    if succeeded {
                        state.release(graph, index);
                    } else {
                        self.report_blocked(&mut state, index).await;
                    }
                }
                Err(err) => {
                    if err.is_fatal() {
                        error!(stack = %stack.fqn(), code = err.code(), error = %err, "Stack failed fatally");
                    } else {
                        warn!(stack = %stack.fqn(), code = err.code(), error = %err, "Stack failed");
                    }
                    let status = StackStatus::failed(err.to_string());
                    ctx.report(stack, status.clone()).await;
                    state.statuses[index] = status;
                    self.report_blocked(&mut state, index).await;
                    if err.is_fatal() && fatal.is_none() {
                        fatal = Some(err);
                    }
                }
            }
        }

        let cancelled = state.statuses.iter().any(|s| *s == StackStatus::Pending);
        for &index in &order {
            if state.statuses[index] == StackStatus::Pending {
                state.statuses[index] = StackStatus::Cancelled;
                ctx.report(graph.stack(index), StackStatus::Cancelled).await;
            }
        }

        if let Some(err) = fatal {
            return Err(err);
        }
        if cancelled {
            warn!(
                reason = %ctx.cancellation().reason().unwrap_or_default(),
                "Run cancelled before all stacks were processed"
            );
        }

        let RunState {
            mut statuses,
            mut diffs,
            ..
        } = state;
        let stacks = order
            .iter()
            .map(|&index| {
                let stack = graph.stack(index);
                StackReport {
                    name: stack.name().to_string(),
                    fqn: stack.fqn().to_string(),
                    status: std::mem::take(&mut statuses[index]),
                    diff: diffs[index].take(),
                }
            })
            .collect();

        let report = RunReport {
            run_id: ctx.run_id(),
            action: kind,
            stacks,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            cancelled,
        };
        info!(
            run_id = %report.run_id,
            action = %kind,
            success = report.success(),
            duration_ms = report.duration_ms,
            "Run finished"
        );

        if with_hooks && report.success() {
            run_hooks(HookStage::PostBuild, &self.hooks.post_build, ctx.hook_runner()).await?;
        }
        Ok(report)
    }

    fn hooks_enabled(&self) -> bool {
        if self.context.options().dump_dir.is_some() {
            if !self.hooks.is_empty() {
                info!("Dumping templates; build hooks skipped");
            }
            return false;
        }
        true
    }

    async fn report_blocked(&self, state: &mut RunState, index: usize) {
        for follower in state.block(&self.graph, index) {
            let stack = self.graph.stack(follower);
            warn!(stack = %stack.fqn(), blocked_by = %self.graph.stack(index).fqn(), "Stack blocked");
            self.context
                .report(stack, state.statuses[follower].clone())
                .await;
        }
    }
}
