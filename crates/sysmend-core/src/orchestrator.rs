//! Retry-bounded repair state machine.
//!
//! One session runs strictly sequentially:
//!
//! ```text
//! Diagnosing -> Retrieving -> [Confirming] -> Executing -> Validating -> Succeeded
//!      ^                                          |            |
//!      +------------- failure, retry_count += 1 --+------------+
//! ```
//!
//! Every failure inside a pass consumes one unit of retry budget. Once
//! `retry_count == max_retries` the only reachable state is `Escalated`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};

use crate::agent::DiagnosticAgent;
use crate::confirm::{ConfirmationDecision, ConfirmationGate, ConfirmationRequest};
use crate::domain::{
    truncate_chars, EscalationReason, ExecutionAttempt, FailureKind, Issue, RepairSession,
    RepairState, SessionOutcome, SessionReport, StepKind, MAX_FAILURE_CONTEXT_CHARS,
};
use crate::exec::{ExecutionEngine, ValidationChecker};
use crate::metrics::METRICS;
use crate::obs;
use crate::retrieval::{RetrievalOutcome, SelectedSolution, SolutionRetriever};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_retries: u32,
    pub confirmation_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            confirmation_timeout_ms: 300_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

/// Shared cancellation request, honoured at the next state boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum PassEnd {
    Finished(SessionOutcome),
    Failed(FailureKind),
}

pub struct RepairOrchestrator {
    agent: DiagnosticAgent,
    retriever: SolutionRetriever,
    engine: ExecutionEngine,
    validator: ValidationChecker,
    gate: Arc<dyn ConfirmationGate>,
    config: OrchestratorConfig,
}

impl RepairOrchestrator {
    pub fn new(
        agent: DiagnosticAgent,
        retriever: SolutionRetriever,
        engine: ExecutionEngine,
        validator: ValidationChecker,
        gate: Arc<dyn ConfirmationGate>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            agent,
            retriever,
            engine,
            validator,
            gate,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one session to a terminal outcome. Never returns an error: every
    /// failure ends up in the report.
    pub async fn run(&self, issue: Issue, cancel: &CancelFlag) -> SessionReport {
        let mut session = RepairSession::new(issue, self.config.max_retries);
        let span = obs::session_span(&session.session_id);
        let started = Instant::now();

        obs::emit_session_started(&session.session_id, session.max_retries);
        METRICS.inc_sessions_started();

        let outcome = self.drive(&mut session, cancel).instrument(span).await;

        match &outcome {
            SessionOutcome::Succeeded { .. } => METRICS.inc_sessions_succeeded(),
            SessionOutcome::Escalated { .. } => METRICS.inc_sessions_escalated(),
            SessionOutcome::Cancelled { .. } => {}
        }
        obs::emit_session_finished(
            &session.session_id,
            outcome.label(),
            session.history.len(),
            started.elapsed().as_millis() as u64,
        );
        METRICS.flush();

        SessionReport::from_session(session, outcome)
    }

    async fn drive(&self, session: &mut RepairSession, cancel: &CancelFlag) -> SessionOutcome {
        loop {
            match self.run_pass(session, cancel).await {
                PassEnd::Finished(outcome) => return outcome,
                PassEnd::Failed(failure) => {
                    let pass = session.current_pass().pass;
                    let consumed = session.consume_retry(failure.clone());
                    obs::emit_attempt_failed(&session.session_id, pass, &failure, session.retry_count);
                    if !consumed {
                        let fallback = fallback_of(session.selected.as_ref());
                        return self.escalate(
                            session,
                            EscalationReason::RetryBudgetExhausted {
                                max_retries: session.max_retries,
                            },
                            fallback,
                        );
                    }
                    METRICS.inc_retries_consumed();
                }
            }
        }
    }

    async fn run_pass(&self, session: &mut RepairSession, cancel: &CancelFlag) -> PassEnd {
        if let Some(outcome) = cancelled(session, cancel) {
            return PassEnd::Finished(outcome);
        }
        // The first pass starts in the initial state; retries re-enter it.
        if !session.history.is_empty() {
            session.transition(RepairState::Diagnosing);
        }
        session.begin_pass();

        let diagnosis = match self.agent.diagnose(&session.issue).await {
            Ok(diagnosis) => diagnosis,
            Err(err) => {
                warn!(error = %err, "diagnostic attempt failed");
                return PassEnd::Failed(FailureKind::from_diagnosis_error(&err));
            }
        };
        session.current_pass().diagnosis = Some(diagnosis.clone());
        session.last_diagnosis = Some(diagnosis.clone());

        if diagnosis.is_inconclusive() {
            return PassEnd::Failed(FailureKind::DiagnosisInconclusive {
                explanation: diagnosis.explanation.clone(),
            });
        }
        if session.budget_exhausted() {
            let fallback = fallback_of(session.selected.as_ref());
            return PassEnd::Finished(self.escalate(
                session,
                EscalationReason::RetryBudgetExhausted {
                    max_retries: session.max_retries,
                },
                fallback,
            ));
        }

        if let Some(outcome) = cancelled(session, cancel) {
            return PassEnd::Finished(outcome);
        }
        session.transition(RepairState::Retrieving);

        let selected = match self.retriever.retrieve(&diagnosis).await {
            Ok(RetrievalOutcome::Selected(selected)) => selected,
            Ok(RetrievalOutcome::Miss { best_score }) => {
                return PassEnd::Finished(self.escalate(
                    session,
                    EscalationReason::RetrievalMiss {
                        category: diagnosis.category,
                        best_score,
                    },
                    None,
                ));
            }
            Err(err) => {
                return PassEnd::Failed(FailureKind::RetrievalFailure {
                    message: err.to_string(),
                })
            }
        };
        {
            let pass = session.current_pass();
            pass.solution_id = Some(selected.solution.id.clone());
            pass.score = Some(selected.score);
        }
        session.selected = Some(selected.clone());

        if selected.requires_confirmation {
            if let Some(outcome) = cancelled(session, cancel) {
                return PassEnd::Finished(outcome);
            }
            session.transition(RepairState::Confirming);

            let request = ConfirmationRequest::new(&selected, &diagnosis);
            let timeout = self.config.confirmation_timeout();
            match tokio::time::timeout(timeout, self.gate.confirm(&request)).await {
                Ok(ConfirmationDecision::Granted) => {
                    info!(solution_id = %request.solution_id, "confirmation granted");
                }
                Ok(ConfirmationDecision::Denied { reason }) => {
                    return PassEnd::Finished(self.escalate(
                        session,
                        EscalationReason::ConfirmationWithheld { reason },
                        fallback_of(Some(&selected)),
                    ));
                }
                Err(_) => {
                    return PassEnd::Finished(self.escalate(
                        session,
                        EscalationReason::ConfirmationTimedOut {
                            timeout_ms: self.config.confirmation_timeout_ms,
                        },
                        fallback_of(Some(&selected)),
                    ));
                }
            }
        }

        if let Some(outcome) = cancelled(session, cancel) {
            return PassEnd::Finished(outcome);
        }
        session.transition(RepairState::Executing);

        let attempt = self.engine.execute(&selected.solution).await;
        session.current_pass().execution = Some(attempt.clone());
        if !attempt.is_success() {
            return PassEnd::Failed(execution_failure(&attempt, self.engine.config().step_timeout_ms));
        }

        if let Some(outcome) = cancelled(session, cancel) {
            return PassEnd::Finished(outcome);
        }
        session.transition(RepairState::Validating);

        let report = self.validator.validate(&selected.solution).await;
        {
            let pass = session.current_pass();
            if let Some(execution) = pass.execution.as_mut() {
                execution.validation_output = Some(report.output.clone());
            }
            pass.validation = Some(report.clone());
        }

        if !report.passed {
            return PassEnd::Failed(FailureKind::ValidationFailure {
                exit_code: report.exit_code,
                timed_out: report.timed_out,
                output: truncate_chars(&report.output, MAX_FAILURE_CONTEXT_CHARS),
            });
        }

        session.transition(RepairState::Succeeded);
        info!(
            solution_id = %selected.solution.id,
            requires_reboot = attempt.requires_reboot,
            "repair validated"
        );
        PassEnd::Finished(SessionOutcome::Succeeded {
            solution_id: selected.solution.id.clone(),
            validation_output: report.output,
            requires_reboot: attempt.requires_reboot,
            history: session.history.clone(),
        })
    }

    fn escalate(
        &self,
        session: &mut RepairSession,
        reason: EscalationReason,
        alternative_solution: Option<String>,
    ) -> SessionOutcome {
        session.transition(RepairState::Escalated);
        warn!(reason = %reason, retry_count = session.retry_count, "session escalated");
        SessionOutcome::Escalated {
            reason,
            history: session.history.clone(),
            alternative_solution,
        }
    }
}

fn fallback_of(selected: Option<&SelectedSolution>) -> Option<String> {
    selected.and_then(|s| s.solution.record.alternative_solution.clone())
}

/// Checked only at state boundaries, so `session.state` is the last state
/// whose work completed (or `Diagnosing` when no pass has run).
fn cancelled(session: &RepairSession, cancel: &CancelFlag) -> Option<SessionOutcome> {
    if !cancel.is_cancelled() {
        return None;
    }
    let unvalidated_attempts = session.unvalidated_attempts();
    warn!(
        last_state = %session.state,
        unvalidated = unvalidated_attempts.len(),
        "session cancelled"
    );
    Some(SessionOutcome::Cancelled {
        last_state: session.state,
        unvalidated_attempts,
        history: session.history.clone(),
    })
}

fn execution_failure(attempt: &ExecutionAttempt, step_timeout_ms: u64) -> FailureKind {
    let Some(step) = attempt.first_failed_step() else {
        return FailureKind::ExecutionStepFailure {
            step_index: 0,
            command: String::new(),
            exit_code: None,
            output: format!("execution of {} failed without a failing step", attempt.solution_id),
        };
    };
    let output = truncate_chars(&step.output, MAX_FAILURE_CONTEXT_CHARS);
    match step.kind {
        StepKind::Backup => FailureKind::ExecutionAborted {
            command: step.command.clone(),
            exit_code: step.exit_code,
            output,
        },
        StepKind::Remediation if step.timed_out => FailureKind::ExecutionTimeout {
            step_index: step.index.unwrap_or_default(),
            command: step.command.clone(),
            timeout_ms: step_timeout_ms,
        },
        StepKind::Remediation => FailureKind::ExecutionStepFailure {
            step_index: step.index.unwrap_or_default(),
            command: step.command.clone(),
            exit_code: step.exit_code,
            output,
        },
    }
}
