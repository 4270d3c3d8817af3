//! Thread wire models.

use crate::db::models::Thread;
use crate::db::repositories::IfExists;
use serde::{Deserialize, Serialize};

/// Body of `POST /threads`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadCreate {
    pub thread_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub if_exists: IfExists,
}

/// Body of `PATCH /threads/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadPatchRequest {
    pub metadata: Option<serde_json::Value>,
    pub config: Option<serde_json::Value>,
}

/// Body of `POST /threads/search` and `/threads/count`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadSearchRequest {
    pub metadata: Option<serde_json::Value>,
    /// Subset match against the thread's last known values.
    pub values: Option<serde_json::Value>,
    pub status: Option<String>,
    pub ids: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Body of `POST /threads/{id}/history` (mirrors the GET query).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryRequest {
    pub limit: Option<i64>,
    pub before: Option<String>,
}

/// Thread response shape.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadView {
    pub thread_id: String,
    pub status: String,
    pub values: serde_json::Value,
    pub config: serde_json::Value,
    pub metadata: serde_json::Value,
    pub interrupts: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Thread> for ThreadView {
    fn from(t: &Thread) -> Self {
        Self {
            thread_id: t.id.clone(),
            status: t.status.clone(),
            values: t.values(),
            config: t.config_value(),
            metadata: t.metadata_value(),
            interrupts: t.interrupts_value(),
            created_at: t.created_at.clone(),
            updated_at: t.updated_at.clone(),
        }
    }
}
