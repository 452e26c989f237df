//! Inference provider seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::capability::CapabilitySpec;
use crate::domain::DiagnosisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// One role-tagged conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Set on tool-result messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(Role::Assistant, "")
        }
    }

    pub fn tool(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: Some(name.into()),
            ..Self::plain(Role::Tool, output)
        }
    }
}

/// Required structured output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

/// What the model did with its turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// Requested one or more tool invocations.
    ToolCalls(Vec<ToolCallRequest>),
    /// Produced a structured answer (not yet validated).
    Final(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("inference transport failed: {0}")]
    Transport(String),

    #[error("inference output was not valid structured output: {0}")]
    Malformed(String),
}

impl From<InferenceError> for DiagnosisError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Transport(msg) => DiagnosisError::Inference(msg),
            InferenceError::Malformed(msg) => DiagnosisError::Parse(msg),
        }
    }
}

/// Opaque language-model completion.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[CapabilitySpec],
        schema: &OutputSchema,
    ) -> Result<ModelTurn, InferenceError>;
}
