//! Core checkpoint data structures.
//!
//! A [`Checkpoint`] captures the channel values of a graph at a point in
//! time. [`CheckpointConfig`] is the compound key that addresses it: the
//! conversation thread, the checkpoint namespace within that thread, and an
//! optional specific checkpoint id (absent means "latest").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Origin of a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Written for the input that started an invocation.
    Input,
    /// Written from inside the execution loop.
    Loop,
    /// Written for a manual state update.
    Update,
    /// Copied from another checkpoint.
    Fork,
}

/// Metadata stored alongside a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckpointMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// Step number: -1 for the input checkpoint, 0.. for loop checkpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i32>,

    /// Additional custom metadata.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_step(mut self, step: i32) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Snapshot of graph channel values at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint format version.
    pub v: i32,

    /// Unique checkpoint id.
    pub id: String,

    /// Creation timestamp.
    pub ts: DateTime<Utc>,

    /// Channel name to serialized value (e.g. `"messages"` to the message
    /// array).
    pub channel_values: HashMap<String, serde_json::Value>,
}

impl Checkpoint {
    /// Current checkpoint format version.
    pub const CURRENT_VERSION: i32 = 1;

    pub fn new(channel_values: HashMap<String, serde_json::Value>) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            channel_values,
        }
    }

    /// Checkpoint whose only channel is a `messages` array.
    pub fn from_messages(messages: serde_json::Value) -> Self {
        let mut channel_values = HashMap::new();
        channel_values.insert("messages".to_string(), messages);
        Self::new(channel_values)
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }
}

/// Compound key addressing a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CheckpointConfig {
    /// Conversation thread id.
    pub thread_id: String,

    /// Checkpoint namespace within the thread. The runtime sets this to
    /// `assistant:<assistant_id>` so agents sharing a thread never share
    /// state; sub-namespaces appended by the framework pass through opaque.
    #[serde(default)]
    pub checkpoint_ns: String,

    /// Specific checkpoint id; `None` addresses the latest checkpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

impl CheckpointConfig {
    pub fn new(thread_id: impl Into<String>, checkpoint_ns: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            checkpoint_ns: checkpoint_ns.into(),
            checkpoint_id: None,
        }
    }

    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }
}

/// A checkpoint together with its key, metadata and parent link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointTuple {
    pub config: CheckpointConfig,
    pub checkpoint: Checkpoint,
    pub metadata: CheckpointMetadata,
    pub parent_config: Option<CheckpointConfig>,
}

/// Client-facing view of a checkpoint, as returned by the thread state and
/// history endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Merged channel values, always a mapping with a `messages` array.
    pub values: serde_json::Value,

    /// Nodes scheduled to run next; empty when the graph is at rest.
    pub next: Vec<String>,

    /// Compound key of the snapshot, so clients can resume or branch.
    pub config: CheckpointConfig,

    pub metadata: CheckpointMetadata,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_config: Option<CheckpointConfig>,
}

impl From<CheckpointTuple> for StateSnapshot {
    fn from(tuple: CheckpointTuple) -> Self {
        let values = serde_json::to_value(&tuple.checkpoint.channel_values)
            .unwrap_or_else(|_| serde_json::json!({}));
        Self {
            values,
            next: Vec::new(),
            config: tuple.config,
            metadata: tuple.metadata,
            created_at: tuple.checkpoint.ts,
            parent_config: tuple.parent_config,
        }
    }
}
