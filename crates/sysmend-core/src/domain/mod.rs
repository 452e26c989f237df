//! Domain model for repair sessions.

pub mod attempt;
pub mod diagnosis;
pub mod error;
pub mod issue;
pub mod session;

pub use attempt::{AttemptOutcome, ExecutionAttempt, StepKind, StepRecord, ValidationReport};
pub use diagnosis::{decode_diagnosis, diagnosis_schema, DiagnosisResult, DiagnosisStatus};
pub use error::{DiagnosisError, EscalationReason, FailureKind, RepairError, Result};
pub use issue::{truncate_chars, Issue, PriorFailure, MAX_FAILURE_CONTEXT_CHARS};
pub use session::{AttemptRecord, RepairSession, RepairState, SessionOutcome, SessionReport};
