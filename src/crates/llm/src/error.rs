//! Error types for LLM providers.

use thiserror::Error;

/// Errors raised while configuring or calling an LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key configured for the requested provider.
    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    /// The HTTP request failed before a response arrived.
    #[error("Request failed: {0}")]
    Request(String),

    /// The provider returned a non-success status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The response body could not be interpreted.
    #[error("Response parse error: {0}")]
    Parse(String),

    /// The `provider:model` string referenced an unknown provider.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider needs configuration the caller did not supply.
    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Request(err.to_string())
    }
}

impl From<LlmError> for agent_graph::GraphError {
    fn from(err: LlmError) -> Self {
        agent_graph::GraphError::Model(err.to_string())
    }
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, LlmError>;
