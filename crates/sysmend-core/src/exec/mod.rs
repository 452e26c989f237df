//! Command execution, remediation and validation.

pub mod command;
pub mod engine;
pub mod validation;

pub use command::{shell_quote, CommandOutput, CommandRunner, ShellCommandRunner};
pub use engine::{ExecutionConfig, ExecutionEngine, PlannedStep, BEST_EFFORT_PREFIX};
pub use validation::ValidationChecker;
