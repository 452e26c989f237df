//! sysmend core library
//!
//! Drives one repair session per reported issue: a diagnostic agent gathers
//! read-only evidence and commits to a structured diagnosis, the solution
//! index supplies a vetted remediation, the [`ExecutionEngine`] applies it
//! behind a backup, and a validation command decides whether the fault is
//! gone. Failures feed back into the next diagnosis until the retry budget
//! runs out and the session escalates.

pub mod agent;
pub mod config;
pub mod confirm;
pub mod domain;
pub mod exec;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod report;
pub mod retrieval;
pub mod telemetry;

pub use agent::{
    standard_registry, AgentConfig, Capability, CapabilityRegistry, DiagnosticAgent,
    InferenceProvider, OllamaInference,
};

pub use config::{EmbedderKind, IndexConfig, ReportConfig, SysmendConfig};

pub use confirm::{ConfirmationDecision, ConfirmationGate, ConfirmationRequest, DenyAll};

pub use domain::{
    AttemptOutcome, AttemptRecord, DiagnosisError, DiagnosisResult, DiagnosisStatus,
    EscalationReason, ExecutionAttempt, FailureKind, Issue, RepairError, RepairSession,
    RepairState, Result, SessionOutcome, SessionReport, ValidationReport,
};

pub use exec::{
    CommandOutput, CommandRunner, ExecutionConfig, ExecutionEngine, ShellCommandRunner,
    ValidationChecker,
};

pub use metrics::{MetricsSnapshot, METRICS};
pub use orchestrator::{CancelFlag, OrchestratorConfig, RepairOrchestrator};
pub use report::{read_session_report, write_session_report};
pub use retrieval::{RetrievalConfig, RetrievalOutcome, SelectedSolution, SolutionRetriever};
pub use telemetry::init_tracing;

pub use solution_index::{Category, RiskLevel, SolutionIndex, SolutionRecord};
