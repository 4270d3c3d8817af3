//! Google Gemini client.
//!
//! Uses `generateContent` only; streaming degrades to the single-chunk
//! default of the `ChatModel` trait.

use crate::config::RemoteLlmConfig;
use crate::error::LlmError;
use agent_graph::{
    ChatModel, ChatRequest, ChatResponse, GraphError, Message, MessageRole, ToolCall,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

/// Client for the Google generative language API.
pub struct GoogleClient {
    config: RemoteLlmConfig,
    client: reqwest::Client,
}

impl GoogleClient {
    pub fn new(config: RemoteLlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base(),
            self.config.model
        )
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        let mut body = json!({ "contents": contents });
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system.join("\n\n")}]});
        }
        if let Some(t) = request.temperature {
            body["generationConfig"] = json!({"temperature": t});
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{"functionDeclarations": declarations}]);
        }
        body
    }
}

fn parse_candidate(value: &Value) -> (String, Vec<ToolCall>) {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    if let Some(parts) = value
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
    {
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                content.push_str(text);
            }
            if let Some(call) = part.get("functionCall") {
                let name = call
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string();
                let args = call.get("args").cloned().unwrap_or(json!({}));
                if !name.is_empty() {
                    tool_calls.push(ToolCall::new(Uuid::new_v4().to_string(), name, args));
                }
            }
        }
    }
    (content, tool_calls)
}

#[async_trait]
impl ChatModel for GoogleClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, request: ChatRequest) -> agent_graph::Result<ChatResponse> {
        let body = self.request_body(&request);
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| GraphError::from(LlmError::from(e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| GraphError::model(format!("invalid response body: {}", e)))?;
        let (content, tool_calls) = parse_candidate(&value);
        Ok(ChatResponse::new(
            Message::ai(content).with_tool_calls(tool_calls),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_maps_to_model_role() {
        let client = GoogleClient::new(RemoteLlmConfig::new(
            "key",
            "https://generativelanguage.googleapis.com/v1beta",
            "gemini-2.0-flash",
        ));
        let body = client.request_body(&ChatRequest::new(vec![
            Message::user("hi"),
            Message::ai("hello"),
        ]));
        assert_eq!(body["contents"][1]["role"], "model");
    }

    #[test]
    fn candidate_parses_function_call() {
        let value = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "checking"},
                    {"functionCall": {"name": "add", "args": {"a": 1}}}
                ]}
            }]
        });
        let (content, calls) = parse_candidate(&value);
        assert_eq!(content, "checking");
        assert_eq!(calls[0].name, "add");
    }
}
