//! Diagnostic agent: capability registry, inference seam and the
//! evidence-gathering loop that ends in one structured diagnosis.

pub mod capability;
pub mod diagnostic;
pub mod inference;
pub mod inspect;
pub mod ollama;
mod prompt;

pub use capability::{
    Capability, CapabilityError, CapabilityRegistry, CapabilitySpec, SUBMIT_DIAGNOSIS_TOOL,
};
pub use diagnostic::{AgentConfig, DiagnosticAgent};
pub use inference::{
    InferenceError, InferenceProvider, Message, ModelTurn, OutputSchema, Role, ToolCallRequest,
};
pub use inspect::{standard_registry, DISK_USAGE, RECENT_LOGS, SERVICE_STATUS};
pub use ollama::OllamaInference;
pub use prompt::{INVESTIGATE_PROMPT, SYSTEM_PROMPT};
