//! Per-invocation configuration passed to the agent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default bound on model/tool alternations in one invocation.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Configuration scoping one agent invocation.
///
/// `thread_id` and `checkpoint_ns` address the checkpoint namespace the
/// invocation reads and writes; the `configurable` map carries the merged
/// assistant/run/runtime settings; `metadata` holds tracing fields injected
/// by the server (user, session, tags).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnableConfig {
    pub thread_id: String,

    pub checkpoint_ns: String,

    pub recursion_limit: usize,

    #[serde(default)]
    pub configurable: Map<String, Value>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl RunnableConfig {
    pub fn new(thread_id: impl Into<String>, checkpoint_ns: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            checkpoint_ns: checkpoint_ns.into(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            configurable: Map::new(),
            metadata: Map::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_configurable(mut self, configurable: Map<String, Value>) -> Self {
        self.configurable = configurable;
        self
    }

    /// String-typed configurable entry, if present.
    pub fn configurable_str(&self, key: &str) -> Option<&str> {
        self.configurable.get(key).and_then(|v| v.as_str())
    }

    /// Checkpoint config addressing this invocation's latest checkpoint.
    pub fn checkpoint_config(&self) -> agent_checkpoint::CheckpointConfig {
        agent_checkpoint::CheckpointConfig::new(&self.thread_id, &self.checkpoint_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_config_carries_namespace() {
        let config = RunnableConfig::new("t1", "assistant:a1");
        let cp = config.checkpoint_config();
        assert_eq!(cp.thread_id, "t1");
        assert_eq!(cp.checkpoint_ns, "assistant:a1");
    }

    #[test]
    fn configurable_str_reads_strings_only() {
        let mut configurable = Map::new();
        configurable.insert("model".to_string(), Value::String("openai:gpt-4o-mini".into()));
        configurable.insert("temperature".to_string(), Value::from(0.5));
        let config = RunnableConfig::new("t", "ns").with_configurable(configurable);
        assert_eq!(config.configurable_str("model"), Some("openai:gpt-4o-mini"));
        assert_eq!(config.configurable_str("temperature"), None);
    }
}
