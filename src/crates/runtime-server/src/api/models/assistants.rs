//! Assistant wire models.

use crate::db::models::Assistant;
use crate::db::repositories::IfExists;
use serde::{Deserialize, Serialize};

/// Body of `POST /assistants`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantCreate {
    /// Client-supplied stable id; generated when absent.
    pub assistant_id: Option<String>,
    pub graph_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub if_exists: IfExists,
}

/// Body of `PATCH /assistants/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantPatchRequest {
    pub graph_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<serde_json::Value>,
    pub context: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

/// Body of `POST /assistants/search` and `/assistants/count`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantSearchRequest {
    pub metadata: Option<serde_json::Value>,
    pub graph_id: Option<String>,
    pub name: Option<String>,
    pub ids: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Assistant response shape.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantView {
    pub assistant_id: String,
    pub graph_id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: i64,
    pub config: serde_json::Value,
    pub context: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Assistant> for AssistantView {
    fn from(a: &Assistant) -> Self {
        Self {
            assistant_id: a.id.clone(),
            graph_id: a.graph_id.clone(),
            name: a.name.clone(),
            description: a.description.clone(),
            version: a.version,
            config: a.config_value(),
            context: a.context_value(),
            metadata: a.metadata_value(),
            created_at: a.created_at.clone(),
            updated_at: a.updated_at.clone(),
        }
    }
}
