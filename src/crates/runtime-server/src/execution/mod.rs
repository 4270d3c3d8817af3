//! Run execution: admission, lifecycle, streaming.

pub mod configurable;
pub mod lifecycle;
pub mod streaming;

pub use lifecycle::{AdmittedRun, RunLifecycle, RunSubmission};
pub use streaming::{CancelRegistry, RunBroadcast, SseEvent};

use crate::api::error::ApiError;
use crate::db::DatabaseError;
use agent_checkpoint::{CheckpointError, CheckpointSaver, InMemoryCheckpointSaver, SqliteCheckpointSaver};
use agent_graph::GraphError;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the run lifecycle engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(msg) => ApiError::NotFound(msg),
            EngineError::Conflict(msg) => ApiError::Conflict(msg),
            EngineError::Validation(msg) => ApiError::Validation(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Source of per-run checkpointer connections.
///
/// The durable variant opens a dedicated connection per acquisition and
/// closes it on release; runs never share a pooled, internally locked
/// connection. The in-memory variant backs tests and dev mode, where one
/// shared saver is the database.
#[derive(Clone)]
pub enum CheckpointerProvider {
    Memory(Arc<InMemoryCheckpointSaver>),
    Sqlite { database_url: String },
}

impl CheckpointerProvider {
    /// Pick a provider for the configured database.
    pub fn for_database(database_url: &str) -> Self {
        if database_url.contains(":memory:") {
            CheckpointerProvider::Memory(Arc::new(InMemoryCheckpointSaver::new()))
        } else {
            CheckpointerProvider::Sqlite {
                database_url: database_url.to_string(),
            }
        }
    }

    pub async fn acquire(&self) -> Result<CheckpointerHandle, EngineError> {
        match self {
            CheckpointerProvider::Memory(saver) => Ok(CheckpointerHandle::Memory(saver.clone())),
            CheckpointerProvider::Sqlite { database_url } => {
                let saver = SqliteCheckpointSaver::connect(database_url).await?;
                Ok(CheckpointerHandle::Sqlite(Arc::new(saver)))
            }
        }
    }
}

/// A scoped checkpointer acquisition. [`release`](Self::release) must run on
/// every exit path; for the SQLite variant it closes the connection.
pub enum CheckpointerHandle {
    Memory(Arc<InMemoryCheckpointSaver>),
    Sqlite(Arc<SqliteCheckpointSaver>),
}

impl CheckpointerHandle {
    pub fn saver(&self) -> Arc<dyn CheckpointSaver> {
        match self {
            CheckpointerHandle::Memory(saver) => saver.clone(),
            CheckpointerHandle::Sqlite(saver) => saver.clone(),
        }
    }

    pub async fn release(self) {
        if let CheckpointerHandle::Sqlite(saver) = self {
            // The lifecycle engine holds the last strong reference by now;
            // if the graph still holds one, the pool closes when it drops.
            if let Ok(saver) = Arc::try_unwrap(saver).map_err(|_| ()) {
                saver.close().await;
            }
        }
    }
}
