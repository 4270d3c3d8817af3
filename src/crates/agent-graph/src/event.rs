//! Events emitted by a running agent.
//!
//! Message deltas are incremental: each carries only the content produced
//! since the previous delta for the same message id. The metadata field
//! names (`langgraph_node`, `ls_model_name`, ...) follow the wire format
//! that streaming client SDKs match on.

use crate::messages::{MessageRole, ToolCall};
use serde::{Deserialize, Serialize};

/// Message-shaped delta. `content` holds only the new text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageChunk {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl MessageChunk {
    pub fn delta(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Observability metadata attached to each message delta.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Graph node that produced the delta.
    pub langgraph_node: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_ns: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ls_model_name: Option<String>,
}

/// An event produced while the agent executes.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Incremental assistant output.
    MessageDelta {
        chunk: MessageChunk,
        metadata: EventMetadata,
    },

    /// A node finished and contributed `values` to the state.
    Update {
        node: String,
        values: serde_json::Value,
    },

    /// The agent finished; `checkpoint_id` addresses the final checkpoint.
    Completed { checkpoint_id: Option<String> },

    /// Execution failed after this point; no further events follow.
    Failed { error: String },
}
