//! User-scoped, namespaced key-value store.
//!
//! The store is cross-thread memory for agents and an internal cache for the
//! runtime (OAuth tokens). Namespaces are ordered lists of path components;
//! values are opaque JSON. All operations are scoped to an owner id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Canonical namespace form: an ordered list of path components.
pub type Namespace = Vec<String>;

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A stored item with its full address and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreItem {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Owner-scoped namespaced KV storage.
///
/// Implementations never interpret values, and must treat the namespace as
/// an ordered list: `search` matches element-wise prefixes, and
/// `list_namespaces` returns each distinct namespace the owner has written.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Upsert. Creation and replacement are indistinguishable to callers.
    async fn put(&self, owner: &str, namespace: &[String], key: &str, value: Value) -> Result<()>;

    async fn get(&self, owner: &str, namespace: &[String], key: &str)
        -> Result<Option<StoreItem>>;

    /// Returns `true` when an item existed and was removed.
    async fn delete(&self, owner: &str, namespace: &[String], key: &str) -> Result<bool>;

    /// Items whose namespace starts with `prefix`, ordered by namespace then
    /// key. An empty prefix matches everything the owner has.
    async fn search(
        &self,
        owner: &str,
        prefix: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoreItem>>;

    /// Distinct namespaces the owner has written to.
    async fn list_namespaces(&self, owner: &str) -> Result<Vec<Namespace>>;
}

type OwnerMap = BTreeMap<(Namespace, String), StoreItem>;

/// In-memory store for tests and dev mode.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<HashMap<String, OwnerMap>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AgentStore for InMemoryStore {
    async fn put(&self, owner: &str, namespace: &[String], key: &str, value: Value) -> Result<()> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let items = inner.entry(owner.to_string()).or_default();
        let map_key = (namespace.to_vec(), key.to_string());
        let created_at = items.get(&map_key).map(|i| i.created_at).unwrap_or(now);
        items.insert(
            map_key,
            StoreItem {
                namespace: namespace.to_vec(),
                key: key.to_string(),
                value,
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn get(
        &self,
        owner: &str,
        namespace: &[String],
        key: &str,
    ) -> Result<Option<StoreItem>> {
        let inner = self.inner.read();
        Ok(inner
            .get(owner)
            .and_then(|items| items.get(&(namespace.to_vec(), key.to_string())))
            .cloned())
    }

    async fn delete(&self, owner: &str, namespace: &[String], key: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        Ok(inner
            .get_mut(owner)
            .map(|items| {
                items
                    .remove(&(namespace.to_vec(), key.to_string()))
                    .is_some()
            })
            .unwrap_or(false))
    }

    async fn search(
        &self,
        owner: &str,
        prefix: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoreItem>> {
        let inner = self.inner.read();
        let Some(items) = inner.get(owner) else {
            return Ok(Vec::new());
        };
        Ok(items
            .values()
            .filter(|item| item.namespace.len() >= prefix.len() && item.namespace[..prefix.len()] == *prefix)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_namespaces(&self, owner: &str) -> Result<Vec<Namespace>> {
        let inner = self.inner.read();
        let Some(items) = inner.get(owner) else {
            return Ok(Vec::new());
        };
        let mut namespaces: Vec<Namespace> = items.keys().map(|(ns, _)| ns.clone()).collect();
        namespaces.dedup();
        Ok(namespaces)
    }
}
