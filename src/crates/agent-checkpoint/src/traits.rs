//! The [`CheckpointSaver`] trait — the storage abstraction the graph writes
//! through during execution and the runtime reads through for the state and
//! history endpoints.
//!
//! Implementations must be `Send + Sync` and isolate histories per
//! `(thread_id, checkpoint_ns)` pair. `get_tuple` with no `checkpoint_id`
//! returns the latest checkpoint in the namespace; `list` returns newest
//! first.

use crate::checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
use crate::error::Result;
use async_trait::async_trait;

/// Upper bound applied to history `limit` values.
pub const HISTORY_LIMIT_MAX: usize = 1000;

/// Clamp a requested history limit into `[1, HISTORY_LIMIT_MAX]`.
pub(crate) fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, HISTORY_LIMIT_MAX)
}

/// Storage backend for graph checkpoints.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Store a checkpoint. Returns the config with the stored checkpoint id
    /// filled in.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig>;

    /// Fetch a checkpoint tuple. With `checkpoint_id` set, that exact
    /// version; otherwise the latest in `(thread_id, checkpoint_ns)`.
    /// `None` when no checkpoint exists (not an error).
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// List checkpoints in the namespace, newest first. `limit` is clamped
    /// to `[1, HISTORY_LIMIT_MAX]`; `before` is an exclusive checkpoint-id
    /// cursor.
    async fn list(
        &self,
        config: &CheckpointConfig,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<CheckpointTuple>>;

    /// Delete every checkpoint for a thread, across all namespaces.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Delete the checkpoints of a single namespace within a thread. Used by
    /// the rollback multitask strategy to discard a cancelled run's state.
    async fn delete_namespace(&self, thread_id: &str, checkpoint_ns: &str) -> Result<()>;
}
