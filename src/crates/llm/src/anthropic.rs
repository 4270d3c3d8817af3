//! Anthropic messages API client with SSE token streaming.

use crate::config::RemoteLlmConfig;
use crate::error::LlmError;
use crate::sse::SseLineBuffer;
use agent_graph::{
    ChatModel, ChatRequest, ChatResponse, GraphError, Message, MessageRole, StreamChunk, ToolCall,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Client for the Anthropic messages API.
pub struct AnthropicClient {
    config: RemoteLlmConfig,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: RemoteLlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.config.base())
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(to_anthropic_message)
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if stream {
            body["stream"] = json!(true);
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

fn to_anthropic_message(message: &Message) -> Value {
    match message.role {
        MessageRole::Assistant => {
            let mut blocks = Vec::new();
            if !message.content.is_empty() {
                blocks.push(json!({"type": "text", "text": message.content}));
            }
            for call in &message.tool_calls {
                blocks.push(json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.args,
                }));
            }
            json!({"role": "assistant", "content": blocks})
        }
        MessageRole::Tool => json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": message.tool_call_id,
                "content": message.content,
            }]
        }),
        // System messages are hoisted into the top-level system field.
        _ => json!({"role": "user", "content": message.content}),
    }
}

fn parse_content_blocks(blocks: Option<&Value>) -> (String, Vec<ToolCall>) {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    if let Some(blocks) = blocks.and_then(|b| b.as_array()) {
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        content.push_str(text);
                    }
                }
                Some("tool_use") => {
                    let id = block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let input = block.get("input").cloned().unwrap_or(json!({}));
                    if !name.is_empty() {
                        tool_calls.push(ToolCall::new(id, name, input));
                    }
                }
                _ => {}
            }
        }
    }
    (content, tool_calls)
}

/// Streaming tool_use block being assembled.
#[derive(Default)]
struct PendingToolUse {
    id: String,
    name: String,
    input_json: String,
}

#[async_trait]
impl ChatModel for AnthropicClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, request: ChatRequest) -> agent_graph::Result<ChatResponse> {
        let body = self.request_body(&request, false);
        let response = self.send(&body).await.map_err(GraphError::from)?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| GraphError::model(format!("invalid response body: {}", e)))?;

        let (content, tool_calls) = parse_content_blocks(value.get("content"));
        Ok(ChatResponse::new(
            Message::ai(content).with_tool_calls(tool_calls),
        ))
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> agent_graph::Result<agent_graph::llm::ChatStream> {
        let body = self.request_body(&request, true);
        let response = self.send(&body).await.map_err(GraphError::from)?;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = SseLineBuffer::new();
            let mut pending: Vec<PendingToolUse> = Vec::new();
            let mut stop_reason: Option<String> = None;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(GraphError::model(e.to_string()))).await;
                        return;
                    }
                };
                for payload in buffer.push(&chunk) {
                    let Ok(value) = serde_json::from_str::<Value>(&payload) else {
                        continue;
                    };
                    match value.get("type").and_then(|t| t.as_str()) {
                        Some("content_block_start") => {
                            let block = value.get("content_block");
                            if block.and_then(|b| b.get("type")).and_then(|t| t.as_str())
                                == Some("tool_use")
                            {
                                pending.push(PendingToolUse {
                                    id: block
                                        .and_then(|b| b.get("id"))
                                        .and_then(|v| v.as_str())
                                        .unwrap_or_default()
                                        .to_string(),
                                    name: block
                                        .and_then(|b| b.get("name"))
                                        .and_then(|v| v.as_str())
                                        .unwrap_or_default()
                                        .to_string(),
                                    input_json: String::new(),
                                });
                            }
                        }
                        Some("content_block_delta") => {
                            match value.pointer("/delta/type").and_then(|t| t.as_str()) {
                                Some("text_delta") => {
                                    if let Some(text) =
                                        value.pointer("/delta/text").and_then(|t| t.as_str())
                                    {
                                        if !text.is_empty()
                                            && tx
                                                .send(Ok(StreamChunk::delta(text)))
                                                .await
                                                .is_err()
                                        {
                                            return;
                                        }
                                    }
                                }
                                Some("input_json_delta") => {
                                    if let Some(fragment) = value
                                        .pointer("/delta/partial_json")
                                        .and_then(|t| t.as_str())
                                    {
                                        if let Some(last) = pending.last_mut() {
                                            last.input_json.push_str(fragment);
                                        }
                                    }
                                }
                                _ => {}
                            }
                        }
                        Some("message_delta") => {
                            if let Some(reason) = value
                                .pointer("/delta/stop_reason")
                                .and_then(|r| r.as_str())
                            {
                                stop_reason = Some(reason.to_string());
                            }
                        }
                        Some("message_stop") => {
                            let tool_calls = pending
                                .drain(..)
                                .filter(|p| !p.name.is_empty())
                                .map(|p| {
                                    let args = if p.input_json.is_empty() {
                                        json!({})
                                    } else {
                                        serde_json::from_str(&p.input_json)
                                            .unwrap_or(Value::String(p.input_json))
                                    };
                                    ToolCall::new(p.id, p.name, args)
                                })
                                .collect();
                            let _ = tx
                                .send(Ok(StreamChunk::finish(
                                    stop_reason.take().unwrap_or_else(|| "end_turn".to_string()),
                                    tool_calls,
                                )))
                                .await;
                            return;
                        }
                        _ => {}
                    }
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_hoisted() {
        let client = AnthropicClient::new(RemoteLlmConfig::new(
            "key",
            "https://api.anthropic.com",
            "claude-sonnet",
        ));
        let request = ChatRequest::new(vec![
            Message::system("be brief"),
            Message::user("hello"),
        ]);
        let body = client.request_body(&request, false);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn tool_result_becomes_user_block() {
        let value = to_anthropic_message(&Message::tool("3", "toolu-1"));
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"][0]["type"], "tool_result");
        assert_eq!(value["content"][0]["tool_use_id"], "toolu-1");
    }

    #[test]
    fn content_blocks_split_text_and_tool_use() {
        let blocks = json!([
            {"type": "text", "text": "let me check"},
            {"type": "tool_use", "id": "toolu-1", "name": "add", "input": {"a": 1, "b": 2}}
        ]);
        let (content, calls) = parse_content_blocks(Some(&blocks));
        assert_eq!(content, "let me check");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "add");
        assert_eq!(calls[0].args["b"], 2);
    }
}
