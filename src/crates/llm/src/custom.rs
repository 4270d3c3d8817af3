//! OpenAI-compatible custom endpoints (vLLM, Ollama, LM Studio, ...).
//!
//! The custom provider is the OpenAI wire format pointed at an explicit
//! `base_url`; an API key is optional because local servers commonly run
//! without one.

use crate::config::RemoteLlmConfig;
use crate::openai::OpenAiClient;
use agent_graph::{ChatModel, ChatRequest, ChatResponse};
use async_trait::async_trait;

/// OpenAI-compatible client for self-hosted model servers.
pub struct CustomClient {
    inner: OpenAiClient,
}

impl CustomClient {
    /// `base_url` must point at an OpenAI-compatible `/chat/completions`
    /// root, e.g. `http://localhost:8000/v1`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        let config = RemoteLlmConfig::new(api_key.unwrap_or_default(), base_url, model);
        Self {
            inner: OpenAiClient::new(config),
        }
    }
}

#[async_trait]
impl ChatModel for CustomClient {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn chat(&self, request: ChatRequest) -> agent_graph::Result<ChatResponse> {
        self.inner.chat(request).await
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> agent_graph::Result<agent_graph::llm::ChatStream> {
        self.inner.chat_stream(request).await
    }
}
