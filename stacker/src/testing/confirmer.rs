//! Pre-programmed confirmation answers.

use crate::confirm::{ConfirmationRequest, Confirmer};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Answers from a script, recording who asked.
///
/// Per-stack answers win over the queue; the queue wins over the default.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    default: bool,
    queue: Mutex<VecDeque<bool>>,
    per_stack: HashMap<String, bool>,
    delay: Option<Duration>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    /// Always answers `answer`.
    #[must_use]
    pub fn always(answer: bool) -> Self {
        Self {
            default: answer,
            ..Self::default()
        }
    }

    /// Answers from `answers` in order, then no.
    #[must_use]
    pub fn answers(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            queue: Mutex::new(answers.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Fixes the answer for one stack.
    #[must_use]
    pub fn with_answer_for(mut self, stack: impl Into<String>, answer: bool) -> Self {
        self.per_stack.insert(stack.into(), answer);
        self
    }

    /// Waits before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the stacks that asked, in order.
    #[must_use]
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        self.asked.lock().push(request.stack.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(&answer) = self.per_stack.get(&request.stack) {
            return answer;
        }
        self.queue.lock().pop_front().unwrap_or(self.default)
    }
}
