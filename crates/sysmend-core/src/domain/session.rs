//! The per-session record threaded through every orchestrator transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attempt::{ExecutionAttempt, ValidationReport};
use super::diagnosis::DiagnosisResult;
use super::error::{EscalationReason, FailureKind};
use super::issue::{Issue, PriorFailure};
use crate::obs;
use crate::retrieval::SelectedSolution;

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    Diagnosing,
    Retrieving,
    Confirming,
    Executing,
    Validating,
    Succeeded,
    Escalated,
}

impl RepairState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Diagnosing => "diagnosing",
            Self::Retrieving => "retrieving",
            Self::Confirming => "confirming",
            Self::Executing => "executing",
            Self::Validating => "validating",
            Self::Succeeded => "succeeded",
            Self::Escalated => "escalated",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Escalated)
    }
}

impl std::fmt::Display for RepairState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that happened in one diagnose/retrieve/execute/validate pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based pass number.
    pub pass: u32,
    /// `retry_count` when the pass started.
    pub retry_count: u32,
    pub diagnosis: Option<DiagnosisResult>,
    pub solution_id: Option<String>,
    pub score: Option<f32>,
    pub execution: Option<ExecutionAttempt>,
    pub validation: Option<ValidationReport>,
    pub failure: Option<FailureKind>,
}

impl AttemptRecord {
    fn new(pass: u32, retry_count: u32) -> Self {
        Self {
            pass,
            retry_count,
            diagnosis: None,
            solution_id: None,
            score: None,
            execution: None,
            validation: None,
            failure: None,
        }
    }

    /// Execution that changed the system without a validation result.
    pub fn unvalidated_execution(&self) -> Option<&ExecutionAttempt> {
        self.execution
            .as_ref()
            .filter(|e| e.applied_changes() && self.validation.is_none())
    }
}

/// Mutable session context. Owned by exactly one running orchestrator.
#[derive(Debug, Clone)]
pub struct RepairSession {
    pub session_id: Uuid,
    /// Issue text as submitted, before any augmentation.
    pub original_issue: String,
    pub issue: Issue,
    pub state: RepairState,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_diagnosis: Option<DiagnosisResult>,
    /// Most recent solution selected in any pass.
    pub selected: Option<SelectedSolution>,
    pub history: Vec<AttemptRecord>,
    pub trail: Vec<RepairState>,
    pub started_at: DateTime<Utc>,
}

impl RepairSession {
    pub fn new(issue: Issue, max_retries: u32) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            original_issue: issue.description.clone(),
            issue,
            state: RepairState::Diagnosing,
            retry_count: 0,
            max_retries,
            last_diagnosis: None,
            selected: None,
            history: Vec::new(),
            trail: vec![RepairState::Diagnosing],
            started_at: Utc::now(),
        }
    }

    pub fn transition(&mut self, next: RepairState) {
        obs::emit_state_transition(&self.session_id, self.state, next, self.retry_count);
        self.state = next;
        self.trail.push(next);
    }

    /// Open a new pass in the history.
    pub fn begin_pass(&mut self) {
        let pass = self.history.len() as u32 + 1;
        self.history.push(AttemptRecord::new(pass, self.retry_count));
    }

    /// The pass in progress. Opens one if none exists yet.
    pub fn current_pass(&mut self) -> &mut AttemptRecord {
        if self.history.is_empty() {
            self.begin_pass();
        }
        let last = self.history.len() - 1;
        &mut self.history[last]
    }

    pub fn budget_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Record `failure` on the current pass. Returns `true` when a retry
    /// was consumed and the issue augmented, `false` when the budget was
    /// already spent.
    pub fn consume_retry(&mut self, failure: FailureKind) -> bool {
        let category = self.last_diagnosis.as_ref().map(|d| d.category);
        let pass = self.current_pass();
        pass.failure = Some(failure.clone());
        let prior = PriorFailure {
            pass: pass.pass,
            category,
            solution_id: pass.solution_id.clone(),
            failure,
        };

        if self.budget_exhausted() {
            return false;
        }
        self.issue.record_failure(prior);
        self.retry_count += 1;
        true
    }

    /// Executions that applied changes which were never validated.
    pub fn unvalidated_attempts(&self) -> Vec<ExecutionAttempt> {
        self.history
            .iter()
            .filter_map(AttemptRecord::unvalidated_execution)
            .cloned()
            .collect()
    }
}

/// Terminal result of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Succeeded {
        solution_id: String,
        validation_output: String,
        requires_reboot: bool,
        history: Vec<AttemptRecord>,
    },
    Escalated {
        reason: EscalationReason,
        history: Vec<AttemptRecord>,
        /// Manual fallback, never auto-run. Taken from the solution this
        /// pass selected, or the last one selected when the budget ran out.
        /// `None` on a retrieval miss.
        alternative_solution: Option<String>,
    },
    Cancelled {
        /// Last state whose work completed before cancellation was honoured.
        last_state: RepairState,
        unvalidated_attempts: Vec<ExecutionAttempt>,
        history: Vec<AttemptRecord>,
    },
}

impl SessionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Escalated { .. } => "escalated",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    pub fn history(&self) -> &[AttemptRecord] {
        match self {
            Self::Succeeded { history, .. }
            | Self::Escalated { history, .. }
            | Self::Cancelled { history, .. } => history,
        }
    }
}

/// Full record of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub issue: String,
    pub final_issue: Issue,
    pub max_retries: u32,
    pub retry_count: u32,
    pub state_trail: Vec<RepairState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: SessionOutcome,
}

impl SessionReport {
    pub fn from_session(session: RepairSession, outcome: SessionOutcome) -> Self {
        Self {
            session_id: session.session_id,
            issue: session.original_issue,
            final_issue: session.issue,
            max_retries: session.max_retries,
            retry_count: session.retry_count,
            state_trail: session.trail,
            started_at: session.started_at,
            finished_at: Utc::now(),
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Succeeded { .. })
    }

    pub fn history(&self) -> &[AttemptRecord] {
        self.outcome.history()
    }

    pub fn execution_attempts(&self) -> Vec<&ExecutionAttempt> {
        self.history()
            .iter()
            .filter_map(|p| p.execution.as_ref())
            .collect()
    }

    pub fn diagnoses(&self) -> Vec<&DiagnosisResult> {
        self.history()
            .iter()
            .filter_map(|p| p.diagnosis.as_ref())
            .collect()
    }
}
