//! Thread model: a conversation and its last known merged state.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Thread status values.
pub mod status {
    pub const IDLE: &str = "idle";
    pub const BUSY: &str = "busy";
    pub const INTERRUPTED: &str = "interrupted";
    pub const ERROR: &str = "error";
}

/// A thread row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Thread {
    pub id: String,
    pub owner_id: String,
    pub status: String,
    pub values_json: Option<String>,
    pub config: String,
    pub metadata: String,
    pub interrupts: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Thread {
    pub fn new(id: String, owner_id: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            owner_id,
            status: status::IDLE.to_string(),
            values_json: None,
            config: "{}".to_string(),
            metadata: "{}".to_string(),
            interrupts: "[]".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Last known merged state, `null` until a run has completed.
    pub fn values(&self) -> serde_json::Value {
        self.values_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(serde_json::Value::Null)
    }

    pub fn metadata_value(&self) -> serde_json::Value {
        super::parse_json_object(&self.metadata)
    }

    pub fn config_value(&self) -> serde_json::Value {
        super::parse_json_object(&self.config)
    }

    pub fn interrupts_value(&self) -> serde_json::Value {
        serde_json::from_str(&self.interrupts).unwrap_or_else(|_| serde_json::json!([]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_thread_is_idle() {
        let t = Thread::new("t1".to_string(), "alice".to_string());
        assert_eq!(t.status, status::IDLE);
        assert_eq!(t.values(), serde_json::Value::Null);
    }
}
