use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use solution_index::Solution;
use tracing::info;

use super::command::CommandRunner;
use crate::domain::ValidationReport;

/// Runs a solution's validation command. Exit 0 is the only pass.
pub struct ValidationChecker {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl ValidationChecker {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    pub async fn validate(&self, solution: &Solution) -> ValidationReport {
        let command = solution.record.validation_command.trim();
        if command.is_empty() {
            return ValidationReport {
                passed: false,
                exit_code: None,
                timed_out: false,
                output: format!("solution {} has no validation command", solution.id),
                checked_at: Utc::now(),
            };
        }

        let output = self.runner.run(command, self.timeout).await;
        let report = ValidationReport {
            passed: output.success(),
            exit_code: output.exit_code,
            timed_out: output.timed_out,
            output: output.combined(),
            checked_at: Utc::now(),
        };
        info!(
            solution_id = %solution.id,
            passed = report.passed,
            exit_code = ?report.exit_code,
            "validation finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::fakes::FakeCommandRunner;
    use solution_index::{Category, RiskLevel, SolutionRecord};

    fn solution(validation: &str) -> Solution {
        Solution::new(
            0,
            SolutionRecord {
                category: Category::Storage,
                error_trigger: "disk full".into(),
                context: String::new(),
                solution_explanation: String::new(),
                risk_level: RiskLevel::Low,
                steps: vec!["apt-get clean".into()],
                backup_required: false,
                requires_reboot: false,
                validation_command: validation.into(),
                alternative_solution: None,
            },
        )
    }

    #[tokio::test]
    async fn test_exit_zero_passes_regardless_of_output() {
        let runner = Arc::new(
            FakeCommandRunner::new().with_result("check", CommandOutput::ok("ERROR: looks bad")),
        );
        let report = ValidationChecker::new(runner, Duration::from_secs(1))
            .validate(&solution("check"))
            .await;
        assert!(report.passed);
        assert_eq!(report.output, "ERROR: looks bad");
    }

    #[tokio::test]
    async fn test_nonzero_fails_with_output() {
        let runner = Arc::new(
            FakeCommandRunner::new().with_result("check", CommandOutput::failed(1, "still 100%")),
        );
        let report = ValidationChecker::new(runner, Duration::from_secs(1))
            .validate(&solution("check"))
            .await;
        assert!(!report.passed);
        assert_eq!(report.exit_code, Some(1));
        assert_eq!(report.output, "still 100%");
    }

    #[tokio::test]
    async fn test_empty_command_never_passes() {
        let runner = Arc::new(FakeCommandRunner::new());
        let report = ValidationChecker::new(runner.clone(), Duration::from_secs(1))
            .validate(&solution("  "))
            .await;
        assert!(!report.passed);
        assert!(runner.commands().is_empty());
    }
}
