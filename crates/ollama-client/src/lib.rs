//! Ollama-Client: thin async bindings for a local Ollama server
//!
//! Used by sysmend for two things: the diagnostic conversation (chat with
//! tool definitions and a JSON-schema constrained final answer) and the
//! embeddings behind the solution index.

pub mod client;
pub mod error;
pub mod types;

pub use client::{OllamaClient, OllamaConfig, DEFAULT_BASE_URL};
pub use error::OllamaError;
pub use types::{
    ChatMessage, ChatResponse, ChatRole, FunctionCall, FunctionDefinition, ToolCall,
    ToolDefinition,
};

/// Result type for Ollama operations
pub type Result<T> = std::result::Result<T, OllamaError>;
