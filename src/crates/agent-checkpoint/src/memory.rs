//! In-memory checkpoint saver for tests and dev mode.

use crate::checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
use crate::error::Result;
use crate::traits::{clamp_limit, CheckpointSaver};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

type NamespaceKey = (String, String);

/// Thread-safe in-memory checkpoint storage.
///
/// Checkpoints are appended per `(thread_id, checkpoint_ns)`; the newest
/// entry is the tail of the vector.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointSaver {
    inner: Arc<RwLock<HashMap<NamespaceKey, Vec<CheckpointTuple>>>>,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints stored for a namespace.
    pub fn len(&self, thread_id: &str, checkpoint_ns: &str) -> usize {
        self.inner
            .read()
            .get(&(thread_id.to_string(), checkpoint_ns.to_string()))
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, thread_id: &str, checkpoint_ns: &str) -> bool {
        self.len(thread_id, checkpoint_ns) == 0
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let key = (config.thread_id.clone(), config.checkpoint_ns.clone());
        let mut inner = self.inner.write();
        let history = inner.entry(key).or_default();

        let parent_config = history.last().map(|prev| prev.config.clone());
        let stored_config = CheckpointConfig {
            thread_id: config.thread_id.clone(),
            checkpoint_ns: config.checkpoint_ns.clone(),
            checkpoint_id: Some(checkpoint.id.clone()),
        };
        history.push(CheckpointTuple {
            config: stored_config.clone(),
            checkpoint,
            metadata,
            parent_config,
        });
        Ok(stored_config)
    }

    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let key = (config.thread_id.clone(), config.checkpoint_ns.clone());
        let inner = self.inner.read();
        let Some(history) = inner.get(&key) else {
            return Ok(None);
        };
        match &config.checkpoint_id {
            Some(id) => Ok(history
                .iter()
                .find(|t| t.checkpoint.id == *id)
                .cloned()),
            None => Ok(history.last().cloned()),
        }
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<CheckpointTuple>> {
        let limit = clamp_limit(limit);
        let key = (config.thread_id.clone(), config.checkpoint_ns.clone());
        let inner = self.inner.read();
        let Some(history) = inner.get(&key) else {
            return Ok(Vec::new());
        };

        let mut newest_first: Vec<&CheckpointTuple> = history.iter().rev().collect();
        if let Some(before_id) = before {
            if let Some(pos) = newest_first.iter().position(|t| t.checkpoint.id == before_id) {
                newest_first = newest_first.split_off(pos + 1);
            }
        }
        Ok(newest_first.into_iter().take(limit).cloned().collect())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.inner.write().retain(|(tid, _), _| tid != thread_id);
        Ok(())
    }

    async fn delete_namespace(&self, thread_id: &str, checkpoint_ns: &str) -> Result<()> {
        self.inner
            .write()
            .remove(&(thread_id.to_string(), checkpoint_ns.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ns: &str) -> CheckpointConfig {
        CheckpointConfig::new("thread-1", ns)
    }

    #[tokio::test]
    async fn put_then_get_latest() {
        let saver = InMemoryCheckpointSaver::new();
        let cp = Checkpoint::from_messages(serde_json::json!([{"role": "user", "content": "a"}]));
        let id = cp.id.clone();

        saver
            .put(&config("assistant:a1"), cp, CheckpointMetadata::new())
            .await
            .unwrap();

        let tuple = saver.get_tuple(&config("assistant:a1")).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.id, id);
        assert_eq!(tuple.config.checkpoint_id, Some(id));
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let saver = InMemoryCheckpointSaver::new();
        saver
            .put(
                &config("assistant:a1"),
                Checkpoint::from_messages(serde_json::json!(["a1 data"])),
                CheckpointMetadata::new(),
            )
            .await
            .unwrap();

        assert!(saver.get_tuple(&config("assistant:a2")).await.unwrap().is_none());
        assert!(saver.get_tuple(&config("assistant:a1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_is_newest_first_with_cursor() {
        let saver = InMemoryCheckpointSaver::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let cp = Checkpoint::from_messages(serde_json::json!([i]));
            ids.push(cp.id.clone());
            saver
                .put(&config("assistant:a1"), cp, CheckpointMetadata::new().with_step(i))
                .await
                .unwrap();
        }

        let all = saver.list(&config("assistant:a1"), 100, None).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].checkpoint.id, ids[4]);

        let before = saver
            .list(&config("assistant:a1"), 100, Some(&ids[2]))
            .await
            .unwrap();
        assert_eq!(before.len(), 2);
        assert_eq!(before[0].checkpoint.id, ids[1]);
    }

    #[tokio::test]
    async fn list_clamps_limit() {
        let saver = InMemoryCheckpointSaver::new();
        for i in 0..3 {
            saver
                .put(
                    &config("assistant:a1"),
                    Checkpoint::from_messages(serde_json::json!([i])),
                    CheckpointMetadata::new(),
                )
                .await
                .unwrap();
        }
        // limit 0 is clamped up to 1
        let one = saver.list(&config("assistant:a1"), 0, None).await.unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn parent_config_links_history() {
        let saver = InMemoryCheckpointSaver::new();
        saver
            .put(
                &config("assistant:a1"),
                Checkpoint::from_messages(serde_json::json!(["first"])),
                CheckpointMetadata::new(),
            )
            .await
            .unwrap();
        saver
            .put(
                &config("assistant:a1"),
                Checkpoint::from_messages(serde_json::json!(["second"])),
                CheckpointMetadata::new(),
            )
            .await
            .unwrap();

        let latest = saver.get_tuple(&config("assistant:a1")).await.unwrap().unwrap();
        assert!(latest.parent_config.is_some());
    }

    #[tokio::test]
    async fn delete_namespace_leaves_siblings() {
        let saver = InMemoryCheckpointSaver::new();
        for ns in ["assistant:a1", "assistant:a2"] {
            saver
                .put(
                    &config(ns),
                    Checkpoint::from_messages(serde_json::json!([])),
                    CheckpointMetadata::new(),
                )
                .await
                .unwrap();
        }
        saver.delete_namespace("thread-1", "assistant:a1").await.unwrap();
        assert!(saver.get_tuple(&config("assistant:a1")).await.unwrap().is_none());
        assert!(saver.get_tuple(&config("assistant:a2")).await.unwrap().is_some());
    }
}
