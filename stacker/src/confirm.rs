//! Operator confirmation of gated changes.
//!
//! A stack waiting for a yes/no decision suspends only itself; other stacks
//! keep running. Prompts are serialised so two stacks never ask at once.

use crate::errors::ConfirmationDeclinedError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// What the operator is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    /// Fully qualified stack name.
    pub stack: String,
    /// The mutating action, e.g. `update` or `destroy`.
    pub action: String,
    /// Lines describing the change.
    pub summary: Vec<String>,
    /// Whether the stack is protected.
    pub protected: bool,
}

impl ConfirmationRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(stack: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            action: action.into(),
            summary: Vec::new(),
            protected: false,
        }
    }

    /// Sets the change summary.
    #[must_use]
    pub fn with_summary(mut self, summary: Vec<String>) -> Self {
        self.summary = summary;
        self
    }

    /// Marks the stack as protected.
    #[must_use]
    pub fn with_protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    /// The question shown to the operator.
    #[must_use]
    pub fn prompt(&self) -> String {
        let marker = if self.protected { " (protected)" } else { "" };
        format!("Execute {} of {}{marker}?", self.action, self.stack)
    }
}

/// How a confirmation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// The operator said yes.
    Approved,
    /// The operator said no.
    Denied,
    /// No answer in time.
    TimedOut,
}

impl fmt::Display for ConfirmationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Denied => write!(f, "declined by operator"),
            Self::TimedOut => write!(f, "no answer before timeout"),
        }
    }
}

/// Asks yes/no questions.
#[async_trait]
pub trait Confirmer: Send + Sync + fmt::Debug {
    /// Returns the operator's decision. Failing to ask counts as no.
    async fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

type Prompter = Box<dyn FnMut(&ConfirmationRequest) -> bool + Send>;

struct PromptJob {
    request: ConfirmationRequest,
    reply: oneshot::Sender<bool>,
}

/// Prompts on the terminal.
///
/// A single prompt thread owns the terminal and answers requests in
/// order. A caller that gives up (e.g. on timeout) drops its reply
/// channel: a queued request is then skipped, and an answer to a prompt
/// already on screen is discarded. The thread is detached, so an
/// unanswered prompt never keeps the process alive.
pub struct TerminalConfirmer {
    jobs: mpsc::UnboundedSender<PromptJob>,
}

impl TerminalConfirmer {
    /// Creates a confirmer prompting with `dialoguer`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_prompter(|request: &ConfirmationRequest| {
            for line in &request.summary {
                eprintln!("    {line}");
            }
            dialoguer::Confirm::new()
                .with_prompt(request.prompt())
                .default(false)
                .interact()
                .unwrap_or(false)
        })
    }

    /// Creates a confirmer that asks through `prompter` on the prompt
    /// thread.
    #[must_use]
    pub fn with_prompter<F>(prompter: F) -> Self
    where
        F: FnMut(&ConfirmationRequest) -> bool + Send + 'static,
    {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new()
            .name("stacker-prompt".to_string())
            .spawn(move || prompt_loop(receiver, Box::new(prompter)));
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to start the prompt thread; every confirmation will be declined");
        }
        Self { jobs }
    }
}

impl Default for TerminalConfirmer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TerminalConfirmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalConfirmer")
            .field("running", &!self.jobs.is_closed())
            .finish()
    }
}

fn prompt_loop(mut receiver: mpsc::UnboundedReceiver<PromptJob>, mut prompter: Prompter) {
    while let Some(job) = receiver.blocking_recv() {
        if job.reply.is_closed() {
            debug!(stack = %job.request.stack, "Confirmation abandoned before prompting");
            continue;
        }
        let answer = prompter(&job.request);
        if job.reply.send(answer).is_err() {
            warn!(stack = %job.request.stack, "Answer arrived after the confirmation timed out; ignored");
        }
    }
}

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        let (reply, answer) = oneshot::channel();
        let job = PromptJob {
            request: request.clone(),
            reply,
        };
        if self.jobs.send(job).is_err() {
            warn!(stack = %request.stack, "Prompt thread is gone; declining");
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

/// Applies a timeout to a confirmer and turns "no" into an error.
#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    confirmer: Arc<dyn Confirmer>,
    timeout: Duration,
}

impl ConfirmationGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(confirmer: Arc<dyn Confirmer>, timeout: Duration) -> Self {
        Self { confirmer, timeout }
    }

    /// Asks and reports how it ended.
    pub async fn ask(&self, request: &ConfirmationRequest) -> ConfirmationOutcome {
        match tokio::time::timeout(self.timeout, self.confirmer.confirm(request)).await {
            Ok(true) => ConfirmationOutcome::Approved,
            Ok(false) => ConfirmationOutcome::Denied,
            Err(_) => ConfirmationOutcome::TimedOut,
        }
    }

    /// Succeeds only on an explicit yes.
    ///
    /// # Errors
    ///
    /// Returns `ConfirmationDeclinedError` on no or timeout.
    pub async fn authorize(&self, request: &ConfirmationRequest) -> Result<(), ConfirmationDeclinedError> {
        let outcome = self.ask(request).await;
        if outcome == ConfirmationOutcome::Approved {
            info!(stack = %request.stack, action = %request.action, "Change confirmed");
            Ok(())
        } else {
            warn!(stack = %request.stack, action = %request.action, %outcome, "Change not confirmed");
            Err(ConfirmationDeclinedError::new(request.stack.as_str(), outcome.to_string()))
        }
    }
}
