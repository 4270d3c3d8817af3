//! Thread state snapshot repository (append-only).

use crate::db::connection::DatabasePool;
use crate::db::error::DbResult;
use crate::db::models::StateSnapshotRow;
use chrono::Utc;

/// Bounds applied to history limits.
pub const HISTORY_LIMIT_MAX: i64 = 1000;

/// Append-only store of merged thread states.
pub struct StateSnapshotRepository;

impl StateSnapshotRepository {
    /// Append a snapshot. Never updates prior rows.
    pub async fn append(
        pool: &DatabasePool,
        thread_id: &str,
        checkpoint_ns: &str,
        checkpoint_id: Option<&str>,
        values: &serde_json::Value,
    ) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO thread_state_snapshots (thread_id, checkpoint_ns, checkpoint_id, values_json, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(thread_id)
        .bind(checkpoint_ns)
        .bind(checkpoint_id)
        .bind(values.to_string())
        .bind(&now)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Latest snapshot for a thread across namespaces.
    pub async fn latest(pool: &DatabasePool, thread_id: &str) -> DbResult<Option<StateSnapshotRow>> {
        let row = sqlx::query_as::<_, StateSnapshotRow>(
            "SELECT * FROM thread_state_snapshots WHERE thread_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(thread_id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// History, newest first. `limit` must already be validated (> 0); it is
    /// clamped to [`HISTORY_LIMIT_MAX`]. `before` is an exclusive
    /// checkpoint-id cursor.
    pub async fn history(
        pool: &DatabasePool,
        thread_id: &str,
        limit: i64,
        before: Option<&str>,
    ) -> DbResult<Vec<StateSnapshotRow>> {
        let limit = limit.min(HISTORY_LIMIT_MAX);
        let rows = match before {
            Some(before_id) => {
                sqlx::query_as::<_, StateSnapshotRow>(
                    "SELECT * FROM thread_state_snapshots
                     WHERE thread_id = ?
                       AND id < (SELECT id FROM thread_state_snapshots
                                 WHERE thread_id = ? AND checkpoint_id = ?
                                 ORDER BY id DESC LIMIT 1)
                     ORDER BY id DESC LIMIT ?",
                )
                .bind(thread_id)
                .bind(thread_id)
                .bind(before_id)
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StateSnapshotRow>(
                    "SELECT * FROM thread_state_snapshots
                     WHERE thread_id = ? ORDER BY id DESC LIMIT ?",
                )
                .bind(thread_id)
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn delete_for_thread(pool: &DatabasePool, thread_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM thread_state_snapshots WHERE thread_id = ?")
            .bind(thread_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseConnection;

    #[tokio::test]
    async fn test_append_and_history_order() {
        let db = DatabaseConnection::for_tests().await;
        for i in 0..3 {
            StateSnapshotRepository::append(
                db.pool(),
                "t1",
                "assistant:a1",
                Some(&format!("cp-{}", i)),
                &serde_json::json!({"messages": [i]}),
            )
            .await
            .unwrap();
        }

        let latest = StateSnapshotRepository::latest(db.pool(), "t1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.checkpoint_id.as_deref(), Some("cp-2"));

        let history = StateSnapshotRepository::history(db.pool(), "t1", 10, None)
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].checkpoint_id.as_deref(), Some("cp-2"));

        let page = StateSnapshotRepository::history(db.pool(), "t1", 10, Some("cp-2"))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].checkpoint_id.as_deref(), Some("cp-1"));
    }

    #[tokio::test]
    async fn test_history_limit_clamped() {
        let db = DatabaseConnection::for_tests().await;
        StateSnapshotRepository::append(db.pool(), "t1", "ns", None, &serde_json::json!({}))
            .await
            .unwrap();
        let rows = StateSnapshotRepository::history(db.pool(), "t1", 10_000, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
