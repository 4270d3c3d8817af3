//! Append-only thread state snapshot rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One historical thread state, written by the run lifecycle engine after
/// each completed run and keyed by the checkpoint that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StateSnapshotRow {
    pub id: i64,
    pub thread_id: String,
    pub checkpoint_ns: String,
    pub checkpoint_id: Option<String>,
    pub values_json: String,
    pub created_at: String,
}

impl StateSnapshotRow {
    pub fn values(&self) -> serde_json::Value {
        serde_json::from_str(&self.values_json).unwrap_or(serde_json::Value::Null)
    }

    /// Wire shape shared with the checkpointer-backed snapshots: values plus
    /// the compound checkpoint key.
    pub fn to_api(&self) -> serde_json::Value {
        serde_json::json!({
            "values": self.values(),
            "next": [],
            "config": {
                "thread_id": self.thread_id,
                "checkpoint_ns": self.checkpoint_ns,
                "checkpoint_id": self.checkpoint_id,
            },
            "created_at": self.created_at,
        })
    }
}
