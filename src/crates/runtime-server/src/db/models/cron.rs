//! Cron model: a recurring run submission.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What to do with the cron after a fired run completes.
pub mod on_run_completed {
    pub const DELETE: &str = "delete";
    pub const KEEP: &str = "keep";
}

/// A cron row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Cron {
    pub id: String,
    pub owner_id: String,
    pub assistant_id: String,
    /// Optional fixed thread; a fresh thread is created per fire when unset.
    pub thread_id: Option<String>,
    pub schedule: String,
    pub payload: String,
    pub end_time: Option<String>,
    pub next_run_date: Option<String>,
    pub on_run_completed: String,
    pub metadata: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Cron {
    pub fn new(id: String, owner_id: String, assistant_id: String, schedule: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            owner_id,
            assistant_id,
            thread_id: None,
            schedule,
            payload: "{}".to_string(),
            end_time: None,
            next_run_date: None,
            on_run_completed: on_run_completed::KEEP.to_string(),
            metadata: "{}".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn payload_value(&self) -> serde_json::Value {
        super::parse_json_object(&self.payload)
    }

    pub fn metadata_value(&self) -> serde_json::Value {
        super::parse_json_object(&self.metadata)
    }

    /// Whether the cron's end time has passed.
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.end_time
            .as_deref()
            .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
            .map(|end| end.with_timezone(&chrono::Utc) <= now)
            .unwrap_or(false)
    }
}
