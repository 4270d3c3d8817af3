//! Chat model abstraction.
//!
//! Provider crates implement [`ChatModel`]; the agent loop only sees this
//! trait. Streaming is delta-based: each [`StreamChunk`] carries only the
//! content produced since the previous chunk. Providers without a native
//! streaming API fall back to the default `chat_stream`, which performs one
//! blocking call and emits the whole response as a single chunk.

use crate::error::{GraphError, Result};
use crate::messages::{Message, ToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A tool made available to the model for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool arguments.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A single chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A complete (non-streaming) chat response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// The assistant message, including any requested tool calls.
    pub message: Message,
    pub usage: Option<UsageMetadata>,
}

impl ChatResponse {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
        }
    }
}

/// One increment of a streaming chat response.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    /// New content since the previous chunk. May be empty for control
    /// chunks (tool-call boundaries, finish markers).
    pub delta: String,

    /// Tool calls requested by the model; carried on the final chunk.
    pub tool_calls: Vec<ToolCall>,

    /// Set on the last chunk of the response.
    pub finish_reason: Option<String>,
}

impl StreamChunk {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            delta: content.into(),
            ..Default::default()
        }
    }

    pub fn finish(reason: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            delta: String::new(),
            tool_calls,
            finish_reason: Some(reason.into()),
        }
    }
}

/// Receiver side of a streaming chat response.
pub type ChatStream = mpsc::Receiver<Result<StreamChunk>>;

/// A chat-capable language model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, used in event metadata.
    fn model_name(&self) -> &str;

    /// Perform a single chat completion.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Stream a chat completion as deltas. The default implementation calls
    /// [`ChatModel::chat`] once and emits the response as one chunk.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let response = self.chat(request).await;
        let (tx, rx) = mpsc::channel(4);
        match response {
            Ok(response) => {
                let content = response.message.content.clone();
                let tool_calls = response.message.tool_calls.clone();
                if !content.is_empty() {
                    let _ = tx.send(Ok(StreamChunk::delta(content))).await;
                }
                let _ = tx.send(Ok(StreamChunk::finish("stop", tool_calls))).await;
            }
            Err(e) => {
                let _ = tx.send(Err(GraphError::model(e.to_string()))).await;
            }
        }
        Ok(rx)
    }
}
