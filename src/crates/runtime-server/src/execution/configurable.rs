//! Configurable construction: the three-layer merge.
//!
//! Layer 1 is the assistant's stored `config.configurable`, layer 2 the
//! caller's per-run `config.configurable`, layer 3 the runtime metadata the
//! server always controls (`run_id`, `thread_id`, `assistant_id` and the
//! checkpoint namespace). Later layers override earlier ones; clients can
//! never pick their own checkpoint namespace.

use crate::config::ObservabilityConfig;
use crate::db::models::Assistant;
use agent_graph::config::DEFAULT_RECURSION_LIMIT;
use agent_graph::RunnableConfig;
use serde_json::{Map, Value};

/// The checkpoint namespace every run of an assistant writes under.
pub fn checkpoint_namespace(assistant_id: &str) -> String {
    format!("assistant:{}", assistant_id)
}

fn overlay(target: &mut Map<String, Value>, source: Option<&Value>) {
    if let Some(Value::Object(map)) = source {
        for (key, value) in map {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn string_tags(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|t| t.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Build the merged per-invocation config.
pub fn build_runnable_config(
    assistant: &Assistant,
    run_config: Option<&Value>,
    run_id: &str,
    thread_id: &str,
    owner_id: &str,
    observability: Option<&ObservabilityConfig>,
) -> RunnableConfig {
    let assistant_config = assistant.config_value();

    let mut configurable = Map::new();
    overlay(&mut configurable, assistant_config.get("configurable"));
    overlay(
        &mut configurable,
        run_config.and_then(|c| c.get("configurable")),
    );

    // Runtime layer: always wins.
    configurable.insert("run_id".to_string(), Value::String(run_id.to_string()));
    configurable.insert("thread_id".to_string(), Value::String(thread_id.to_string()));
    configurable.insert(
        "assistant_id".to_string(),
        Value::String(assistant.id.clone()),
    );
    configurable.insert(
        "checkpoint_ns".to_string(),
        Value::String(checkpoint_namespace(&assistant.id)),
    );

    let recursion_limit = run_config
        .and_then(|c| c.get("recursion_limit"))
        .or_else(|| assistant_config.get("recursion_limit"))
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(DEFAULT_RECURSION_LIMIT);

    let mut tags = string_tags(assistant_config.get("tags"));
    tags.extend(string_tags(run_config.and_then(|c| c.get("tags"))));

    let mut config = RunnableConfig::new(thread_id, checkpoint_namespace(&assistant.id))
        .with_recursion_limit(recursion_limit)
        .with_configurable(configurable);
    config.tags = tags.clone();

    // Trace metadata injection is a no-op without an observability backend.
    if observability.is_some() {
        config
            .metadata
            .insert("user_id".to_string(), Value::String(owner_id.to_string()));
        config.metadata.insert(
            "session_id".to_string(),
            Value::String(thread_id.to_string()),
        );
        config.metadata.insert(
            "run_name".to_string(),
            Value::String(format!("run:{}", run_id)),
        );
        config.metadata.insert(
            "tags".to_string(),
            Value::Array(tags.into_iter().map(Value::String).collect()),
        );
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assistant_with_config(config: Value) -> Assistant {
        let mut assistant = Assistant::new(
            "a1".to_string(),
            "alice".to_string(),
            "agent".to_string(),
            "test".to_string(),
        );
        assistant.config = config.to_string();
        assistant
    }

    #[test]
    fn later_layers_override_earlier() {
        let assistant = assistant_with_config(json!({
            "configurable": {"model": "openai:gpt-4o-mini", "temperature": 0.2}
        }));
        let run_config = json!({"configurable": {"temperature": 0.9}});

        let config =
            build_runnable_config(&assistant, Some(&run_config), "r1", "t1", "alice", None);
        assert_eq!(config.configurable_str("model"), Some("openai:gpt-4o-mini"));
        assert_eq!(
            config.configurable.get("temperature"),
            Some(&json!(0.9))
        );
    }

    #[test]
    fn runtime_layer_always_wins() {
        let assistant = assistant_with_config(json!({}));
        // A malicious run config trying to escape its namespace.
        let run_config = json!({"configurable": {"checkpoint_ns": "assistant:other", "run_id": "fake"}});

        let config =
            build_runnable_config(&assistant, Some(&run_config), "r1", "t1", "alice", None);
        assert_eq!(config.configurable_str("checkpoint_ns"), Some("assistant:a1"));
        assert_eq!(config.configurable_str("run_id"), Some("r1"));
        assert_eq!(config.checkpoint_ns, "assistant:a1");
    }

    #[test]
    fn recursion_limit_resolution_order() {
        let assistant = assistant_with_config(json!({"recursion_limit": 7}));
        let config = build_runnable_config(&assistant, None, "r1", "t1", "alice", None);
        assert_eq!(config.recursion_limit, 7);

        let run_config = json!({"recursion_limit": 3});
        let config =
            build_runnable_config(&assistant, Some(&run_config), "r1", "t1", "alice", None);
        assert_eq!(config.recursion_limit, 3);

        let bare = assistant_with_config(json!({}));
        let config = build_runnable_config(&bare, None, "r1", "t1", "alice", None);
        assert_eq!(config.recursion_limit, DEFAULT_RECURSION_LIMIT);
    }

    #[test]
    fn tracing_metadata_only_with_observability() {
        let assistant = assistant_with_config(json!({"tags": ["prod"]}));

        let plain = build_runnable_config(&assistant, None, "r1", "t1", "alice", None);
        assert!(plain.metadata.is_empty());

        let observability = ObservabilityConfig {
            public_key: "pk".to_string(),
            secret_key: "sk".to_string(),
        };
        let traced =
            build_runnable_config(&assistant, None, "r1", "t1", "alice", Some(&observability));
        assert_eq!(traced.metadata.get("user_id"), Some(&json!("alice")));
        assert_eq!(traced.metadata.get("session_id"), Some(&json!("t1")));
        assert_eq!(traced.tags, vec!["prod"]);
    }
}
