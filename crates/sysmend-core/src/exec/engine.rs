//! Serial application of a solution's remediation steps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use solution_index::Solution;
use tracing::{info, warn};
use uuid::Uuid;

use super::command::{CommandOutput, CommandRunner};
use crate::domain::{AttemptOutcome, ExecutionAttempt, StepKind, StepRecord};
use crate::metrics::METRICS;

/// Marks a step as best-effort, make-style.
pub const BEST_EFFORT_PREFIX: char = '-';

pub const DEFAULT_BACKUP_COMMAND: &str =
    "mkdir -p /var/backups/sysmend && tar -czf /var/backups/sysmend/{solution_id}-{timestamp}.tar.gz /etc";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Per-step wall-clock bound (milliseconds).
    pub step_timeout_ms: u64,
    /// Bound for the validation command (milliseconds).
    pub validation_timeout_ms: u64,
    /// Backup command template; `{solution_id}` and `{timestamp}` are substituted.
    pub backup_command: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: 300_000,
            validation_timeout_ms: 60_000,
            backup_command: DEFAULT_BACKUP_COMMAND.to_string(),
        }
    }
}

impl ExecutionConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    pub fn backup_command_for(&self, solution_id: &str) -> String {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        self.backup_command
            .replace("{solution_id}", solution_id)
            .replace("{timestamp}", &timestamp)
    }
}

/// A step after marker parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub command: String,
    pub best_effort: bool,
}

impl PlannedStep {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.strip_prefix(BEST_EFFORT_PREFIX) {
            Some(rest) => Self {
                command: rest.trim_start().to_string(),
                best_effort: true,
            },
            None => Self {
                command: trimmed.to_string(),
                best_effort: false,
            },
        }
    }
}

/// Applies solutions through a [`CommandRunner`].
pub struct ExecutionEngine {
    runner: Arc<dyn CommandRunner>,
    config: ExecutionConfig,
}

impl ExecutionEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ExecutionConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Run the backup (if required) and then every step in listed order.
    ///
    /// Stops at the first failing required step. Never reorders steps and
    /// never reboots; `requires_reboot` is only copied into the result.
    pub async fn execute(&self, solution: &Solution) -> ExecutionAttempt {
        let started_at = Utc::now();
        let record = &solution.record;
        let mut steps = Vec::with_capacity(record.steps.len() + 1);

        info!(
            solution_id = %solution.id,
            steps = record.steps.len(),
            backup = record.backup_required,
            "executing solution"
        );

        if record.backup_required {
            let command = self.config.backup_command_for(&solution.id);
            let backup = self.run_step(None, StepKind::Backup, command, false).await;
            let ok = backup.succeeded();
            steps.push(backup);
            if !ok {
                warn!(solution_id = %solution.id, "backup failed; aborting before any remediation");
                return self.finish(solution, AttemptOutcome::Aborted, steps, record.steps.len(), started_at);
            }
        }

        let mut outcome = AttemptOutcome::Success;
        let mut skipped = 0;
        for (index, raw) in record.steps.iter().enumerate() {
            if outcome == AttemptOutcome::Failed {
                skipped = record.steps.len() - index;
                break;
            }
            let planned = PlannedStep::parse(raw);
            let step = self
                .run_step(Some(index), StepKind::Remediation, planned.command, planned.best_effort)
                .await;
            if !step.succeeded() {
                if step.best_effort {
                    warn!(solution_id = %solution.id, step = index, "best-effort step failed; continuing");
                } else {
                    warn!(solution_id = %solution.id, step = index, "required step failed; aborting remaining steps");
                    outcome = AttemptOutcome::Failed;
                }
            }
            steps.push(step);
        }

        self.finish(solution, outcome, steps, skipped, started_at)
    }

    async fn run_step(
        &self,
        index: Option<usize>,
        kind: StepKind,
        command: String,
        best_effort: bool,
    ) -> StepRecord {
        let started_at = Utc::now();
        let output: CommandOutput = self.runner.run(&command, self.config.step_timeout()).await;
        let finished_at = Utc::now();
        METRICS.inc_steps_executed();

        StepRecord {
            index,
            kind,
            command,
            best_effort,
            exit_code: output.exit_code,
            timed_out: output.timed_out,
            output: output.combined(),
            started_at,
            finished_at,
        }
    }

    fn finish(
        &self,
        solution: &Solution,
        outcome: AttemptOutcome,
        steps: Vec<StepRecord>,
        skipped_steps: usize,
        started_at: chrono::DateTime<Utc>,
    ) -> ExecutionAttempt {
        info!(
            solution_id = %solution.id,
            outcome = ?outcome,
            executed = steps.len(),
            skipped = skipped_steps,
            requires_reboot = solution.record.requires_reboot,
            "execution finished"
        );
        ExecutionAttempt {
            attempt_id: Uuid::new_v4(),
            solution_id: solution.id.clone(),
            outcome,
            steps,
            skipped_steps,
            requires_reboot: solution.record.requires_reboot,
            validation_output: None,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
