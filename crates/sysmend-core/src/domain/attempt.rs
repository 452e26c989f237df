use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of applying one solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failed,
    /// The backup step failed; nothing else ran.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Backup,
    Remediation,
}

/// One executed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position in the solution's step list; the backup step has none.
    pub index: Option<usize>,
    pub kind: StepKind,
    pub command: String,
    pub best_effort: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Result of one [`ExecutionEngine`](crate::ExecutionEngine) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub attempt_id: Uuid,
    pub solution_id: String,
    pub outcome: AttemptOutcome,
    pub steps: Vec<StepRecord>,
    /// Steps listed in the solution but never started.
    pub skipped_steps: usize,
    /// Surfaced for the caller; never acted on.
    pub requires_reboot: bool,
    /// Filled in once validation has run.
    pub validation_output: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionAttempt {
    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }

    /// True if any remediation step ran, so the system may have changed.
    pub fn applied_changes(&self) -> bool {
        self.steps.iter().any(|s| s.kind == StepKind::Remediation)
    }

    /// First required step that did not succeed.
    pub fn first_failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| !s.best_effort && !s.succeeded())
    }
}

/// Result of a validation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub output: String,
    pub checked_at: DateTime<Utc>,
}
