//! Deterministic fakes for the external seams (testing only)
//!
//! Provides `FakeCommandRunner`, `ScriptedInference` and
//! `StaticConfirmation`, which satisfy the trait contracts without touching
//! the host or a model server.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::agent::{
    CapabilitySpec, InferenceError, InferenceProvider, Message, ModelTurn, OutputSchema,
    ToolCallRequest,
};
use crate::confirm::{ConfirmationDecision, ConfirmationGate, ConfirmationRequest};
use crate::exec::{CommandOutput, CommandRunner};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// FakeCommandRunner
// ---------------------------------------------------------------------------

/// One recorded command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Scripted [`CommandRunner`].
///
/// Lookup order: exact command, then the first matching prefix, then the
/// default (exit 0, empty output). A scripted sequence yields its outputs in
/// order and then keeps repeating the last one.
#[derive(Debug, Default)]
pub struct FakeCommandRunner {
    exact: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    prefixes: Vec<(String, CommandOutput)>,
    default: Option<CommandOutput>,
    invocations: Mutex<Vec<Invocation>>,
}

impl FakeCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, command: impl Into<String>, output: CommandOutput) -> Self {
        self.with_sequence(command, vec![output])
    }

    pub fn with_sequence(mut self, command: impl Into<String>, outputs: Vec<CommandOutput>) -> Self {
        self.exact
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command.into(), outputs.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>, output: CommandOutput) -> Self {
        self.prefixes.push((prefix.into(), output));
        self
    }

    pub fn with_default(mut self, output: CommandOutput) -> Self {
        self.default = Some(output);
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        lock(&self.invocations).clone()
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.invocations)
            .iter()
            .map(|i| i.command.clone())
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        lock(&self.invocations)
            .iter()
            .filter(|i| i.command == command)
            .count()
    }

    fn output_for(&self, command: &str) -> CommandOutput {
        if let Some(queue) = lock(&self.exact).get_mut(command) {
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(output) = next {
                return output;
            }
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .or_else(|| self.default.clone())
            .unwrap_or_else(|| CommandOutput::ok(""))
    }
}

#[async_trait]
impl CommandRunner for FakeCommandRunner {
    async fn run(&self, command: &str, _timeout: Duration) -> CommandOutput {
        let started_at = Utc::now();
        let output = self.output_for(command);
        lock(&self.invocations).push(Invocation {
            command: command.to_string(),
            started_at,
            finished_at: Utc::now(),
        });
        output
    }
}

// ---------------------------------------------------------------------------
// ScriptedInference
// ---------------------------------------------------------------------------

/// [`InferenceProvider`] that replays queued turns and records every
/// conversation it was shown. An exhausted script is a transport error.
#[derive(Debug, Default)]
pub struct ScriptedInference {
    turns: Mutex<VecDeque<Result<ModelTurn, InferenceError>>>,
    conversations: Mutex<Vec<Vec<Message>>>,
    delay: Duration,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, turn: Result<ModelTurn, InferenceError>) -> Self {
        self.turns
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(turn);
        self
    }

    pub fn then_tools(self, calls: Vec<ToolCallRequest>) -> Self {
        self.push(Ok(ModelTurn::ToolCalls(calls)))
    }

    pub fn then_final(self, answer: Value) -> Self {
        self.push(Ok(ModelTurn::Final(answer)))
    }

    pub fn then_error(self, error: InferenceError) -> Self {
        self.push(Err(error))
    }

    /// Sleep before every turn.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn conversations(&self) -> Vec<Vec<Message>> {
        lock(&self.conversations).clone()
    }

    pub fn calls(&self) -> usize {
        lock(&self.conversations).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.turns).len()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedInference {
    async fn complete(
        &self,
        conversation: &[Message],
        _tools: &[CapabilitySpec],
        _schema: &OutputSchema,
    ) -> Result<ModelTurn, InferenceError> {
        lock(&self.conversations).push(conversation.to_vec());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        lock(&self.turns)
            .pop_front()
            .unwrap_or_else(|| Err(InferenceError::Transport("script exhausted".to_string())))
    }
}

// ---------------------------------------------------------------------------
// StaticConfirmation
// ---------------------------------------------------------------------------

/// [`ConfirmationGate`] with a fixed answer, optionally after a delay.
#[derive(Debug)]
pub struct StaticConfirmation {
    decision: ConfirmationDecision,
    delay: Duration,
    requests: Mutex<Vec<ConfirmationRequest>>,
}

impl StaticConfirmation {
    pub fn granted() -> Self {
        Self::answering(ConfirmationDecision::Granted)
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::answering(ConfirmationDecision::Denied {
            reason: reason.into(),
        })
    }

    /// Never answers within any reasonable timeout.
    pub fn unresponsive() -> Self {
        Self::granted().with_delay(Duration::from_secs(3600))
    }

    fn answering(decision: ConfirmationDecision) -> Self {
        Self {
            decision,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ConfirmationGate for StaticConfirmation {
    async fn confirm(&self, request: &ConfirmationRequest) -> ConfirmationDecision {
        lock(&self.requests).push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.decision.clone()
    }
}
