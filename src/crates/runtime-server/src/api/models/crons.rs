//! Cron wire models.

use crate::db::models::Cron;
use serde::{Deserialize, Serialize};

/// Body of `POST /runs/crons`.
#[derive(Debug, Clone, Deserialize)]
pub struct CronCreate {
    pub assistant_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub schedule: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub on_run_completed: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Body of `POST /runs/crons/search` and `/runs/crons/count`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CronSearchRequest {
    pub assistant_id: Option<String>,
    pub thread_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Cron response shape.
#[derive(Debug, Clone, Serialize)]
pub struct CronView {
    pub cron_id: String,
    pub assistant_id: String,
    pub thread_id: Option<String>,
    pub schedule: String,
    pub payload: serde_json::Value,
    pub end_time: Option<String>,
    pub next_run_date: Option<String>,
    pub on_run_completed: String,
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Cron> for CronView {
    fn from(c: &Cron) -> Self {
        Self {
            cron_id: c.id.clone(),
            assistant_id: c.assistant_id.clone(),
            thread_id: c.thread_id.clone(),
            schedule: c.schedule.clone(),
            payload: c.payload_value(),
            end_time: c.end_time.clone(),
            next_run_date: c.next_run_date.clone(),
            on_run_completed: c.on_run_completed.clone(),
            metadata: c.metadata_value(),
            created_at: c.created_at.clone(),
            updated_at: c.updated_at.clone(),
        }
    }
}
