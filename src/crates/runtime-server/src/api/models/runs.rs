//! Run wire models.

use crate::db::models::run::MultitaskStrategy;
use crate::db::models::Run;
use serde::{Deserialize, Serialize};

/// Body of the run-creating endpoints (`POST /threads/{id}/runs[/stream|/wait]`
/// and the stateless `/runs[...]` variants).
#[derive(Debug, Clone, Deserialize)]
pub struct RunCreate {
    pub assistant_id: String,
    /// Either `{"messages": [...]}` or a bare message array.
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub multitask_strategy: MultitaskStrategy,
}

/// Run response shape.
#[derive(Debug, Clone, Serialize)]
pub struct RunView {
    pub run_id: String,
    pub thread_id: String,
    pub assistant_id: String,
    pub status: String,
    pub multitask_strategy: String,
    pub kwargs: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Run> for RunView {
    fn from(r: &Run) -> Self {
        Self {
            run_id: r.id.clone(),
            thread_id: r.thread_id.clone(),
            assistant_id: r.assistant_id.clone(),
            status: r.status.clone(),
            multitask_strategy: r.multitask_strategy.clone(),
            kwargs: r.kwargs_value(),
            metadata: r.metadata_value(),
            created_at: r.created_at.clone(),
            updated_at: r.updated_at.clone(),
        }
    }
}
