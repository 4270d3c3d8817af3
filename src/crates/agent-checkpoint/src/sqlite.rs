//! SQLite-backed checkpoint saver.
//!
//! Each saver owns a dedicated connection acquired for the duration of a
//! single request scope. The runtime never routes concurrent run streams
//! through one shared, internally locked pool; `connect` is called per run
//! and `close` releases the connection on every exit path.

use crate::checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
use crate::error::{CheckpointError, Result};
use crate::traits::{clamp_limit, CheckpointSaver};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;

/// Row shape of the `checkpoints` table.
#[derive(Debug, FromRow)]
struct CheckpointRow {
    thread_id: String,
    checkpoint_ns: String,
    checkpoint_id: String,
    checkpoint: String,
    metadata: String,
    parent_checkpoint_id: Option<String>,
}

impl CheckpointRow {
    fn into_tuple(self) -> Result<CheckpointTuple> {
        let checkpoint: Checkpoint = serde_json::from_str(&self.checkpoint)?;
        let metadata: CheckpointMetadata = serde_json::from_str(&self.metadata)?;
        let parent_config = self.parent_checkpoint_id.map(|id| CheckpointConfig {
            thread_id: self.thread_id.clone(),
            checkpoint_ns: self.checkpoint_ns.clone(),
            checkpoint_id: Some(id),
        });
        Ok(CheckpointTuple {
            config: CheckpointConfig {
                thread_id: self.thread_id,
                checkpoint_ns: self.checkpoint_ns,
                checkpoint_id: Some(self.checkpoint_id),
            },
            checkpoint,
            metadata,
            parent_config,
        })
    }
}

/// Durable checkpoint storage over a single SQLite connection.
pub struct SqliteCheckpointSaver {
    pool: SqlitePool,
}

impl SqliteCheckpointSaver {
    /// Open a dedicated connection to the given database and ensure the
    /// checkpoints table exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| CheckpointError::Storage(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let saver = Self { pool };
        saver.ensure_schema().await?;
        Ok(saver)
    }

    /// Wrap an existing pool. Used by tests that share one in-memory
    /// database across savers.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let saver = Self { pool };
        saver.ensure_schema().await?;
        Ok(saver)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT NOT NULL,
                checkpoint_ns TEXT NOT NULL,
                checkpoint_id TEXT NOT NULL,
                checkpoint TEXT NOT NULL,
                metadata TEXT NOT NULL,
                parent_checkpoint_id TEXT,
                created_at TEXT NOT NULL,
                PRIMARY KEY (thread_id, checkpoint_ns, checkpoint_id)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Release the underlying connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CheckpointSaver for SqliteCheckpointSaver {
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        if config.thread_id.is_empty() {
            return Err(CheckpointError::InvalidConfig(
                "thread_id is required".to_string(),
            ));
        }

        let parent_id: Option<String> = sqlx::query_scalar(
            "SELECT checkpoint_id FROM checkpoints
             WHERE thread_id = ? AND checkpoint_ns = ?
             ORDER BY rowid DESC LIMIT 1",
        )
        .bind(&config.thread_id)
        .bind(&config.checkpoint_ns)
        .fetch_optional(&self.pool)
        .await?;

        let checkpoint_id = checkpoint.id.clone();
        let checkpoint_json = serde_json::to_string(&checkpoint)?;
        let metadata_json = serde_json::to_string(&metadata)?;
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO checkpoints
                (thread_id, checkpoint_ns, checkpoint_id, checkpoint, metadata, parent_checkpoint_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (thread_id, checkpoint_ns, checkpoint_id) DO UPDATE SET
                checkpoint = excluded.checkpoint,
                metadata = excluded.metadata",
        )
        .bind(&config.thread_id)
        .bind(&config.checkpoint_ns)
        .bind(&checkpoint_id)
        .bind(&checkpoint_json)
        .bind(&metadata_json)
        .bind(&parent_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(CheckpointConfig {
            thread_id: config.thread_id.clone(),
            checkpoint_ns: config.checkpoint_ns.clone(),
            checkpoint_id: Some(checkpoint_id),
        })
    }

    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let row: Option<CheckpointRow> = match &config.checkpoint_id {
            Some(id) => {
                sqlx::query_as(
                    "SELECT thread_id, checkpoint_ns, checkpoint_id, checkpoint, metadata, parent_checkpoint_id
                     FROM checkpoints
                     WHERE thread_id = ? AND checkpoint_ns = ? AND checkpoint_id = ?",
                )
                .bind(&config.thread_id)
                .bind(&config.checkpoint_ns)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT thread_id, checkpoint_ns, checkpoint_id, checkpoint, metadata, parent_checkpoint_id
                     FROM checkpoints
                     WHERE thread_id = ? AND checkpoint_ns = ?
                     ORDER BY rowid DESC LIMIT 1",
                )
                .bind(&config.thread_id)
                .bind(&config.checkpoint_ns)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        row.map(CheckpointRow::into_tuple).transpose()
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<CheckpointTuple>> {
        let limit = clamp_limit(limit) as i64;
        let rows: Vec<CheckpointRow> = match before {
            Some(before_id) => {
                sqlx::query_as(
                    "SELECT thread_id, checkpoint_ns, checkpoint_id, checkpoint, metadata, parent_checkpoint_id
                     FROM checkpoints
                     WHERE thread_id = ? AND checkpoint_ns = ?
                       AND rowid < (SELECT rowid FROM checkpoints
                                    WHERE thread_id = ? AND checkpoint_ns = ? AND checkpoint_id = ?)
                     ORDER BY rowid DESC LIMIT ?",
                )
                .bind(&config.thread_id)
                .bind(&config.checkpoint_ns)
                .bind(&config.thread_id)
                .bind(&config.checkpoint_ns)
                .bind(before_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT thread_id, checkpoint_ns, checkpoint_id, checkpoint, metadata, parent_checkpoint_id
                     FROM checkpoints
                     WHERE thread_id = ? AND checkpoint_ns = ?
                     ORDER BY rowid DESC LIMIT ?",
                )
                .bind(&config.thread_id)
                .bind(&config.checkpoint_ns)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(CheckpointRow::into_tuple).collect()
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_namespace(&self, thread_id: &str, checkpoint_ns: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ? AND checkpoint_ns = ?")
            .bind(thread_id)
            .bind(checkpoint_ns)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
