//! Conversational message types.
//!
//! Thread state always has the shape `{"messages": [...]}` where each
//! element is a role-tagged message object. The assistant role serializes as
//! `"ai"` on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions and constraints for the model.
    System,
    /// End-user input.
    User,
    /// Model output.
    #[serde(rename = "ai")]
    Assistant,
    /// Output of a tool call.
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the tool result message.
    pub id: String,

    /// Tool name.
    pub name: String,

    /// JSON arguments.
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable message id; messages with the same id replace each other when
    /// merged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub role: MessageRole,

    pub content: String,

    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// For tool messages, the id of the call this message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Tool result message answering `tool_call_id`.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Assign an id if the message arrived without one.
    pub fn ensure_id(&mut self) {
        if self.id.is_none() {
            self.id = Some(Uuid::new_v4().to_string());
        }
    }
}

/// Merge two message lists: messages on the right replace same-id messages
/// on the left, everything else appends in order.
pub fn add_messages(left: Vec<Message>, right: Vec<Message>) -> Vec<Message> {
    let mut merged = left;
    for mut msg in right {
        msg.ensure_id();
        let incoming_id = msg.id.clone();
        match merged
            .iter()
            .position(|m| m.id.is_some() && m.id == incoming_id)
        {
            Some(pos) => merged[pos] = msg,
            None => merged.push(msg),
        }
    }
    merged
}

/// Parse a `{"messages": [...]}` value into typed messages. Entries that do
/// not parse are skipped.
pub fn messages_from_values(values: &serde_json::Value) -> Vec<Message> {
    values
        .get("messages")
        .and_then(|m| m.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
