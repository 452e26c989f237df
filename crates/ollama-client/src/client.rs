//! Ollama HTTP client
//!
//! Talks to a local (or remote) Ollama server for chat completions with
//! tool definitions and structured-output schemas, and for text embeddings.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::OllamaError;
use crate::types::{
    ChatMessage, ChatOptions, ChatRequest, ChatResponse, EmbedRequest, EmbedResponse,
    ToolDefinition,
};
use crate::Result;

/// Default Ollama endpoint when `OLLAMA_HOST` is not set.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Ollama configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Server URL
    pub base_url: String,
    /// Chat model used for diagnosis
    pub model: String,
    /// Model used for `/api/embed`
    pub embed_model: String,
    /// Sampling temperature (0-1)
    pub temperature: f32,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        OllamaConfig {
            base_url: std::env::var("OLLAMA_HOST")
                .map(|h| normalize_host(&h))
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: "llama3.1:8b".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            temperature: 0.1,
            request_timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific server and chat model
    pub fn new(base_url: &str, model: &str) -> Self {
        OllamaConfig {
            base_url: normalize_host(base_url),
            model: model.to_string(),
            ..Self::default()
        }
    }

    /// Set the embedding model
    pub fn with_embed_model(mut self, model: &str) -> Self {
        self.embed_model = model.to_string();
        self
    }
}

/// `OLLAMA_HOST` is often given as `host:port` without a scheme.
fn normalize_host(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Ollama client for chat and embedding calls
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("sysmend-ollama-client/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OllamaError::InvalidConfig(e.to_string()))?;

        Ok(OllamaClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Check whether the server answers `GET /api/tags`
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Ollama not reachable at {}: {}", self.config.base_url, e);
                false
            }
        }
    }

    /// Run one non-streaming chat turn.
    ///
    /// `format` is a JSON schema constraining the final answer; `tools` are
    /// advertised to the model, which may answer with tool calls instead.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        format: Option<&Value>,
    ) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.config.base_url);
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            tools,
            format,
            stream: false,
            options: ChatOptions {
                temperature: self.config.temperature,
            },
        };

        debug!(
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.len(),
            "sending chat request"
        );

        let response = self.http_client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Ollama chat failed with {}: {}", status, body);
            return Err(OllamaError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: ChatResponse = serde_json::from_slice(&bytes)?;
        Ok(parsed)
    }

    /// Embed a batch of texts with the configured embedding model.
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.config.base_url);
        let request = EmbedRequest {
            model: &self.config.embed_model,
            input: inputs,
        };

        let response = self.http_client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OllamaError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: EmbedResponse = serde_json::from_slice(&bytes)?;
        if parsed.embeddings.len() != inputs.len() {
            return Err(OllamaError::EmptyResponse(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(parsed.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host_adds_scheme() {
        assert_eq!(normalize_host("127.0.0.1:11434"), "http://127.0.0.1:11434");
        assert_eq!(normalize_host("https://ollama.lan/"), "https://ollama.lan");
    }

    #[test]
    fn test_config_new_keeps_defaults() {
        let config = OllamaConfig::new("localhost:11434", "qwen2.5-coder:3b");
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.model, "qwen2.5-coder:3b");
        assert!((config.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_toml_partial() {
        let config: OllamaConfig = serde_json::from_str(r#"{"model": "mistral"}"#).unwrap();
        assert_eq!(config.model, "mistral");
        assert_eq!(config.request_timeout_secs, 120);
    }
}
