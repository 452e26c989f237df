//! [`InferenceProvider`] backed by a local Ollama server.

use async_trait::async_trait;
use ollama_client::{
    ChatMessage, ChatResponse, ChatRole, FunctionCall, OllamaClient, ToolCall, ToolDefinition,
};
use serde_json::Value;
use tracing::debug;

use super::capability::CapabilitySpec;
use super::inference::{
    InferenceError, InferenceProvider, Message, ModelTurn, OutputSchema, Role, ToolCallRequest,
};

pub struct OllamaInference {
    client: OllamaClient,
}

impl OllamaInference {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        Role::System => ChatRole::System,
        Role::User => ChatRole::User,
        Role::Assistant => ChatRole::Assistant,
        Role::Tool => ChatRole::Tool,
    };
    let mut chat = ChatMessage::new(role, message.content.clone());
    chat.tool_name = message.tool_name.clone();
    chat.tool_calls = message
        .tool_calls
        .iter()
        .map(|c| ToolCall {
            function: FunctionCall {
                name: c.name.clone(),
                arguments: c.arguments.clone(),
            },
        })
        .collect();
    chat
}

fn to_tool_definition(spec: &CapabilitySpec) -> ToolDefinition {
    ToolDefinition::function(&spec.name, &spec.description, spec.parameters.clone())
}

/// Tool calls win over content; otherwise the content must be one JSON
/// document. No text scraping.
fn interpret(response: ChatResponse) -> Result<ModelTurn, InferenceError> {
    let message = response.message;
    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|c| ToolCallRequest::new(c.function.name, c.function.arguments))
            .collect();
        return Ok(ModelTurn::ToolCalls(calls));
    }

    let content = message.content.trim();
    if content.is_empty() {
        return Err(InferenceError::Malformed(
            "model returned neither tool calls nor content".to_string(),
        ));
    }
    serde_json::from_str::<Value>(content)
        .map(ModelTurn::Final)
        .map_err(|e| InferenceError::Malformed(format!("content is not JSON: {e}")))
}

#[async_trait]
impl InferenceProvider for OllamaInference {
    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[CapabilitySpec],
        schema: &OutputSchema,
    ) -> Result<ModelTurn, InferenceError> {
        let messages: Vec<ChatMessage> = conversation.iter().map(to_chat_message).collect();
        let tools: Vec<ToolDefinition> = tools.iter().map(to_tool_definition).collect();

        let response = self
            .client
            .chat(&messages, &tools, Some(&schema.schema))
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;
        debug!(model = %response.model, done = response.done, "chat turn received");
        interpret(response)
    }
}
