//! Error and failure taxonomy for repair sessions.
//!
//! [`RepairError`] is for genuine faults of the machinery (bad config,
//! corrupt artifacts, index I/O). Everything that can go wrong *inside* a
//! repair pass is a [`FailureKind`] recorded in the session history, and
//! every terminal failure is an [`EscalationReason`]; neither is raised.

use serde::{Deserialize, Serialize};
use solution_index::{Category, IndexError};

/// Errors produced by a single diagnostic attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosisError {
    #[error("diagnosis output did not match the required schema: {0}")]
    Parse(String),

    #[error("inference provider failed: {0}")]
    Inference(String),

    #[error("inference timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// sysmend machinery errors.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("diagnosis error: {0}")]
    Diagnosis(#[from] DiagnosisError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("retrieval rejected: {0}")]
    RetrievalRejected(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sysmend operations.
pub type Result<T> = std::result::Result<T, RepairError>;

/// Why one repair pass failed. Each one consumes a unit of retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Inference output did not conform to the diagnosis schema.
    DiagnosisParse { message: String },
    /// Inference provider unreachable or erroring.
    DiagnosisInference { message: String },
    /// Inference call exceeded its wall-clock bound.
    DiagnosisTimeout { timeout_ms: u64 },
    /// Diagnosis ended as needs_investigation after all evidence rounds.
    DiagnosisInconclusive { explanation: String },
    /// The index could not be queried.
    RetrievalFailure { message: String },
    /// Backup step failed; no remediation step ran.
    ExecutionAborted {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },
    /// A required remediation step exited non-zero.
    ExecutionStepFailure {
        step_index: usize,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },
    /// A required remediation step exceeded its timeout.
    ExecutionTimeout {
        step_index: usize,
        command: String,
        timeout_ms: u64,
    },
    /// Remediation applied but the validation check did not pass.
    ValidationFailure {
        exit_code: Option<i32>,
        timed_out: bool,
        output: String,
    },
}

impl FailureKind {
    pub fn from_diagnosis_error(err: &DiagnosisError) -> Self {
        match err {
            DiagnosisError::Parse(message) => Self::DiagnosisParse {
                message: message.clone(),
            },
            DiagnosisError::Inference(message) => Self::DiagnosisInference {
                message: message.clone(),
            },
            DiagnosisError::Timeout { timeout_ms } => Self::DiagnosisTimeout {
                timeout_ms: *timeout_ms,
            },
        }
    }

    /// Short label used in logs and failure context.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DiagnosisParse { .. } => "diagnosis_parse",
            Self::DiagnosisInference { .. } => "diagnosis_inference",
            Self::DiagnosisTimeout { .. } => "diagnosis_timeout",
            Self::DiagnosisInconclusive { .. } => "diagnosis_inconclusive",
            Self::RetrievalFailure { .. } => "retrieval_failure",
            Self::ExecutionAborted { .. } => "execution_aborted",
            Self::ExecutionStepFailure { .. } => "execution_step_failure",
            Self::ExecutionTimeout { .. } => "execution_timeout",
            Self::ValidationFailure { .. } => "validation_failure",
        }
    }

    /// Text fed back into the next diagnostic pass.
    pub fn context_text(&self) -> String {
        match self {
            Self::DiagnosisParse { message } => {
                format!("The previous diagnosis could not be parsed: {message}")
            }
            Self::DiagnosisInference { message } => {
                format!("The previous diagnosis could not be obtained: {message}")
            }
            Self::DiagnosisTimeout { timeout_ms } => {
                format!("The previous diagnosis timed out after {timeout_ms}ms")
            }
            Self::DiagnosisInconclusive { explanation } => {
                format!("The previous diagnosis was inconclusive: {explanation}")
            }
            Self::RetrievalFailure { message } => {
                format!("The solution index could not be queried: {message}")
            }
            Self::ExecutionAborted {
                command,
                exit_code,
                output,
            } => format!(
                "Backup step `{command}` failed (exit {}); nothing was applied. Output:\n{output}",
                render_exit(*exit_code)
            ),
            Self::ExecutionStepFailure {
                step_index,
                command,
                exit_code,
                output,
            } => format!(
                "Remediation step {step_index} `{command}` failed (exit {}). Output:\n{output}",
                render_exit(*exit_code)
            ),
            Self::ExecutionTimeout {
                step_index,
                command,
                timeout_ms,
            } => format!("Remediation step {step_index} `{command}` timed out after {timeout_ms}ms"),
            Self::ValidationFailure {
                exit_code,
                timed_out,
                output,
            } => {
                let how = if *timed_out {
                    "timed out".to_string()
                } else {
                    format!("exit {}", render_exit(*exit_code))
                };
                format!("The fix was applied but validation failed ({how}). Output:\n{output}")
            }
        }
    }
}

fn render_exit(code: Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Terminal failure of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationReason {
    /// No solution cleared the similarity threshold.
    RetrievalMiss {
        category: Category,
        best_score: Option<f32>,
    },
    /// Operator declined a solution that needed confirmation.
    ConfirmationWithheld { reason: String },
    /// Nobody answered the confirmation request in time.
    ConfirmationTimedOut { timeout_ms: u64 },
    /// `retry_count` reached `max_retries` without success.
    RetryBudgetExhausted { max_retries: u32 },
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetrievalMiss {
                category,
                best_score,
            } => match best_score {
                Some(s) => write!(f, "no {category} solution above threshold (best {s:.3})"),
                None => write!(f, "no {category} solution in the corpus"),
            },
            Self::ConfirmationWithheld { reason } => write!(f, "confirmation withheld: {reason}"),
            Self::ConfirmationTimedOut { timeout_ms } => {
                write!(f, "confirmation timed out after {timeout_ms}ms")
            }
            Self::RetryBudgetExhausted { max_retries } => {
                write!(f, "retry budget exhausted ({max_retries} retries)")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_error_display() {
        let err = RepairError::InvalidConfig("top_k must be >= 1".to_string());
        assert!(err.to_string().contains("invalid configuration"));

        let err = RepairError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        assert!(err.to_string().contains("abc123"));
        assert!(err.to_string().contains("def456"));
    }

    #[test]
    fn test_failure_from_diagnosis_error() {
        let kind = FailureKind::from_diagnosis_error(&DiagnosisError::Timeout { timeout_ms: 50 });
        assert_eq!(kind, FailureKind::DiagnosisTimeout { timeout_ms: 50 });
        assert_eq!(kind.label(), "diagnosis_timeout");
    }

    #[test]
    fn test_validation_failure_context_carries_output() {
        let kind = FailureKind::ValidationFailure {
            exit_code: Some(1),
            timed_out: false,
            output: "/dev/sda1 100%".to_string(),
        };
        let text = kind.context_text();
        assert!(text.contains("validation failed (exit 1)"));
        assert!(text.contains("/dev/sda1 100%"));
    }

    #[test]
    fn test_failure_kind_serde_tag() {
        let kind = FailureKind::DiagnosisInconclusive {
            explanation: "logs empty".into(),
        };
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["kind"], "diagnosis_inconclusive");
    }

    #[test]
    fn test_escalation_display() {
        let r = EscalationReason::RetrievalMiss {
            category: Category::Network,
            best_score: None,
        };
        assert_eq!(r.to_string(), "no network solution in the corpus");
    }

    #[test]
    fn test_escalation_reason_serde_roundtrip() {
        let withheld = EscalationReason::ConfirmationWithheld {
            reason: "not during business hours".into(),
        };
        let value = serde_json::to_value(&withheld).unwrap();
        assert_eq!(value["kind"], "confirmation_withheld");
        assert_eq!(value["reason"], "not during business hours");
        let back: EscalationReason = serde_json::from_value(value).unwrap();
        assert_eq!(back, withheld);
    }
}
