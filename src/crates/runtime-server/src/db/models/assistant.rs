//! Assistant model: a reusable agent configuration.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An assistant row.
///
/// `config` holds `{"tags": [...], "recursion_limit": n, "configurable":
/// {...}}`; `version` starts at 1 and increments on every patch.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assistant {
    pub id: String,
    pub owner_id: String,
    pub graph_id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: i64,
    pub config: String,
    pub context: String,
    pub metadata: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Assistant {
    pub fn new(id: String, owner_id: String, graph_id: String, name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            owner_id,
            graph_id,
            name,
            description: None,
            version: 1,
            config: "{}".to_string(),
            context: "{}".to_string(),
            metadata: "{}".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn config_value(&self) -> serde_json::Value {
        super::parse_json_object(&self.config)
    }

    pub fn context_value(&self) -> serde_json::Value {
        super::parse_json_object(&self.context)
    }

    pub fn metadata_value(&self) -> serde_json::Value {
        super::parse_json_object(&self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_assistant_defaults() {
        let a = Assistant::new(
            "a1".to_string(),
            "alice".to_string(),
            "agent".to_string(),
            "My agent".to_string(),
        );
        assert_eq!(a.version, 1);
        assert_eq!(a.config_value(), serde_json::json!({}));
    }

    #[test]
    fn test_malformed_config_degrades_to_empty() {
        let mut a = Assistant::new(
            "a1".to_string(),
            "alice".to_string(),
            "agent".to_string(),
            String::new(),
        );
        a.config = "not json".to_string();
        assert_eq!(a.config_value(), serde_json::json!({}));
    }
}
