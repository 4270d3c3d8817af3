//! SQLite-backed store.

use crate::store::{join_namespace, split_namespace};
use agent_graph::store::{AgentStore, Namespace, Result, StoreError, StoreItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

#[derive(Debug, FromRow)]
struct StoreRow {
    namespace: String,
    key: String,
    value: String,
    created_at: String,
    updated_at: String,
}

impl StoreRow {
    fn into_item(self) -> Result<StoreItem> {
        let value = serde_json::from_str(&self.value)?;
        Ok(StoreItem {
            namespace: split_namespace(&self.namespace),
            key: self.key,
            value,
            created_at: parse_ts(&self.created_at),
            updated_at: parse_ts(&self.updated_at),
        })
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn storage_error(err: sqlx::Error) -> StoreError {
    StoreError::Storage(err.to_string())
}

/// Durable store over the repository pool.
///
/// The `namespace` column always holds the slash-joined canonical form; the
/// callers pass the list form and the conversion happens only here.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentStore for SqliteStore {
    async fn put(
        &self,
        owner: &str,
        namespace: &[String],
        key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO store_items (owner_id, namespace, key, value, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (owner_id, namespace, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
        )
        .bind(owner)
        .bind(join_namespace(namespace))
        .bind(key)
        .bind(value.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get(
        &self,
        owner: &str,
        namespace: &[String],
        key: &str,
    ) -> Result<Option<StoreItem>> {
        let row: Option<StoreRow> = sqlx::query_as(
            "SELECT namespace, key, value, created_at, updated_at
             FROM store_items WHERE owner_id = ? AND namespace = ? AND key = ?",
        )
        .bind(owner)
        .bind(join_namespace(namespace))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;
        row.map(StoreRow::into_item).transpose()
    }

    async fn delete(&self, owner: &str, namespace: &[String], key: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM store_items WHERE owner_id = ? AND namespace = ? AND key = ?")
                .bind(owner)
                .bind(join_namespace(namespace))
                .bind(key)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn search(
        &self,
        owner: &str,
        prefix: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoreItem>> {
        let rows: Vec<StoreRow> = if prefix.is_empty() {
            sqlx::query_as(
                "SELECT namespace, key, value, created_at, updated_at
                 FROM store_items WHERE owner_id = ?
                 ORDER BY namespace, key LIMIT ? OFFSET ?",
            )
            .bind(owner)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?
        } else {
            let joined = join_namespace(prefix);
            sqlx::query_as(
                "SELECT namespace, key, value, created_at, updated_at
                 FROM store_items
                 WHERE owner_id = ? AND (namespace = ? OR namespace LIKE ? || '/%')
                 ORDER BY namespace, key LIMIT ? OFFSET ?",
            )
            .bind(owner)
            .bind(&joined)
            .bind(&joined)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?
        };
        rows.into_iter().map(StoreRow::into_item).collect()
    }

    async fn list_namespaces(&self, owner: &str) -> Result<Vec<Namespace>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT namespace FROM store_items WHERE owner_id = ? ORDER BY namespace",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(rows.into_iter().map(|(ns,)| split_namespace(&ns)).collect())
    }
}
