//! Error types for ollama-client

use thiserror::Error;

/// Errors that can occur while talking to an Ollama server
#[derive(Error, Debug)]
pub enum OllamaError {
    /// Transport-level failure (connection refused, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Server answered with a non-success status
    #[error("Ollama returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server answered but the payload carried nothing usable
    #[error("empty response from Ollama: {0}")]
    EmptyResponse(String),

    /// Client could not be constructed from the given configuration
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for OllamaError {
    fn from(err: reqwest::Error) -> Self {
        OllamaError::Http(err.to_string())
    }
}
