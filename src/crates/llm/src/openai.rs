//! OpenAI chat completions client with SSE token streaming.

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

/// Client for the OpenAI chat completions API (and compatible servers).
pub struct OpenAiClient {
    config: RemoteLlmConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: RemoteLlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base())
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(to_openai_message).collect();
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
        });
        if stream {
            body["stream"] = json!(true);
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = request.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
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
            .bearer_auth(&self.config.api_key)
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

fn to_openai_message(message: &Message) -> Value {
    match message.role {
        MessageRole::System => json!({"role": "system", "content": message.content}),
        MessageRole::User => json!({"role": "user", "content": message.content}),
        MessageRole::Assistant => {
            let mut value = json!({"role": "assistant", "content": message.content});
            if !message.tool_calls.is_empty() {
                let calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c.args.to_string(),
                            }
                        })
                    })
                    .collect();
                value["tool_calls"] = json!(calls);
            }
            value
        }
        MessageRole::Tool => json!({
            "role": "tool",
            "content": message.content,
            "tool_call_id": message.tool_call_id,
        }),
    }
}

fn parse_tool_calls(value: Option<&Value>) -> Vec<ToolCall> {
    let Some(calls) = value.and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|call| {
            let id = call.get("id")?.as_str()?.to_string();
            let function = call.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let raw_args = function
                .get("arguments")
                .and_then(|a| a.as_str())
                .unwrap_or("{}");
            let args = serde_json::from_str(raw_args)
                .unwrap_or_else(|_| Value::String(raw_args.to_string()));
            Some(ToolCall::new(id, name, args))
        })
        .collect()
}

/// Accumulates streamed tool-call fragments keyed by their index.
#[derive(Default)]
struct ToolCallAccumulator {
    partial: Vec<(String, String, String)>,
}

impl ToolCallAccumulator {
    fn feed(&mut self, deltas: &Value) {
        let Some(deltas) = deltas.as_array() else {
            return;
        };
        for delta in deltas {
            let index = delta.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as usize;
            while self.partial.len() <= index {
                self.partial
                    .push((String::new(), String::new(), String::new()));
            }
            let slot = &mut self.partial[index];
            if let Some(id) = delta.get("id").and_then(|v| v.as_str()) {
                slot.0 = id.to_string();
            }
            if let Some(function) = delta.get("function") {
                if let Some(name) = function.get("name").and_then(|v| v.as_str()) {
                    slot.1.push_str(name);
                }
                if let Some(args) = function.get("arguments").and_then(|v| v.as_str()) {
                    slot.2.push_str(args);
                }
            }
        }
    }

    fn finish(self) -> Vec<ToolCall> {
        self.partial
            .into_iter()
            .filter(|(_, name, _)| !name.is_empty())
            .map(|(id, name, args)| {
                let args = serde_json::from_str(&args)
                    .unwrap_or_else(|_| Value::String(args));
                ToolCall::new(id, name, args)
            })
            .collect()
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
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

        let message = value
            .pointer("/choices/0/message")
            .ok_or_else(|| GraphError::model("response has no choices"))?;
        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();
        let tool_calls = parse_tool_calls(message.get("tool_calls"));

        Ok(ChatResponse::new(
            Message::ai(content).with_tool_calls(tool_calls),
        ))
    }

    async fn chat_stream(&self, request: ChatRequest) -> agent_graph::Result<agent_graph::llm::ChatStream> {
        let body = self.request_body(&request, true);
        let response = self.send(&body).await.map_err(GraphError::from)?;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = SseLineBuffer::new();
            let mut tool_calls = ToolCallAccumulator::default();
            let mut finish_reason: Option<String> = None;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(GraphError::model(e.to_string()))).await;
                        return;
                    }
                };
                for payload in buffer.push(&chunk) {
                    if payload == "[DONE]" {
                        let _ = tx
                            .send(Ok(StreamChunk::finish(
                                finish_reason.take().unwrap_or_else(|| "stop".to_string()),
                                std::mem::take(&mut tool_calls).finish(),
                            )))
                            .await;
                        return;
                    }
                    let Ok(value) = serde_json::from_str::<Value>(&payload) else {
                        continue;
                    };
                    if let Some(reason) = value
                        .pointer("/choices/0/finish_reason")
                        .and_then(|r| r.as_str())
                    {
                        finish_reason = Some(reason.to_string());
                    }
                    if let Some(deltas) = value.pointer("/choices/0/delta/tool_calls") {
                        tool_calls.feed(deltas);
                    }
                    if let Some(content) = value
                        .pointer("/choices/0/delta/content")
                        .and_then(|c| c.as_str())
                    {
                        if !content.is_empty()
                            && tx.send(Ok(StreamChunk::delta(content))).await.is_err()
                        {
                            return;
                        }
                    }
                }
            }
            // Stream ended without [DONE]; flush what we have.
            let _ = tx
                .send(Ok(StreamChunk::finish(
                    finish_reason.unwrap_or_else(|| "stop".to_string()),
                    tool_calls.finish(),
                )))
                .await;
        });
        Ok(rx)
    }
}
