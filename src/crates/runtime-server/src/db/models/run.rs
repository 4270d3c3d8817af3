//! Run model: one invocation of an assistant on a thread.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Run status values. Transitions are one-way:
/// `pending -> running -> {success, error, timeout, interrupted}`.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const RUNNING: &str = "running";
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
    pub const TIMEOUT: &str = "timeout";
    pub const INTERRUPTED: &str = "interrupted";

    /// A run in one of these states occupies its thread.
    pub fn is_active(status: &str) -> bool {
        status == PENDING || status == RUNNING
    }
}

/// Policy applied when a new run arrives on a thread with an active run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MultitaskStrategy {
    #[default]
    Reject,
    Enqueue,
    Rollback,
    Interrupt,
}

impl MultitaskStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MultitaskStrategy::Reject => "reject",
            MultitaskStrategy::Enqueue => "enqueue",
            MultitaskStrategy::Rollback => "rollback",
            MultitaskStrategy::Interrupt => "interrupt",
        }
    }
}

/// A run row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub assistant_id: String,
    pub owner_id: String,
    pub status: String,
    pub multitask_strategy: String,
    pub kwargs: String,
    pub metadata: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Run {
    pub fn new(
        id: String,
        thread_id: String,
        assistant_id: String,
        owner_id: String,
        multitask_strategy: MultitaskStrategy,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            thread_id,
            assistant_id,
            owner_id,
            status: status::PENDING.to_string(),
            multitask_strategy: multitask_strategy.as_str().to_string(),
            kwargs: "{}".to_string(),
            metadata: "{}".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_kwargs(mut self, kwargs: serde_json::Value) -> Self {
        self.kwargs = kwargs.to_string();
        self
    }

    pub fn kwargs_value(&self) -> serde_json::Value {
        super::parse_json_object(&self.kwargs)
    }

    pub fn metadata_value(&self) -> serde_json::Value {
        super::parse_json_object(&self.metadata)
    }

    pub fn is_terminal(&self) -> bool {
        !status::is_active(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_pending() {
        let run = Run::new(
            "r1".to_string(),
            "t1".to_string(),
            "a1".to_string(),
            "alice".to_string(),
            MultitaskStrategy::Reject,
        );
        assert_eq!(run.status, status::PENDING);
        assert!(!run.is_terminal());
        assert_eq!(run.multitask_strategy, "reject");
    }

    #[test]
    fn test_multitask_strategy_serde() {
        let s: MultitaskStrategy = serde_json::from_str("\"enqueue\"").unwrap();
        assert_eq!(s, MultitaskStrategy::Enqueue);
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"enqueue\"");
    }
}
