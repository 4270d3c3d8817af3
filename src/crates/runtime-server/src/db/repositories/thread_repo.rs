//! Thread repository.

use crate::db::connection::DatabasePool;
use crate::db::error::{DatabaseError, DbResult};
use crate::db::models::Thread;
use crate::db::repositories::IfExists;
use chrono::Utc;

/// Fields a PATCH may change.
#[derive(Debug, Clone, Default)]
pub struct ThreadPatch {
    pub metadata: Option<serde_json::Value>,
    pub config: Option<serde_json::Value>,
}

/// Thread repository.
pub struct ThreadRepository;

impl ThreadRepository {
    pub async fn create(
        pool: &DatabasePool,
        thread: Thread,
        if_exists: IfExists,
    ) -> DbResult<Thread> {
        if let Some(existing) = Self::get_unscoped(pool, &thread.id).await? {
            return match if_exists {
                IfExists::DoNothing if existing.owner_id == thread.owner_id => Ok(existing),
                _ => Err(DatabaseError::ConstraintViolation(format!(
                    "thread {} already exists",
                    thread.id
                ))),
            };
        }

        sqlx::query(
            "INSERT INTO threads
                (id, owner_id, status, values_json, config, metadata, interrupts, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&thread.id)
        .bind(&thread.owner_id)
        .bind(&thread.status)
        .bind(&thread.values_json)
        .bind(&thread.config)
        .bind(&thread.metadata)
        .bind(&thread.interrupts)
        .bind(&thread.created_at)
        .bind(&thread.updated_at)
        .execute(pool)
        .await?;

        Ok(thread)
    }

    pub async fn get(pool: &DatabasePool, id: &str, owner_id: &str) -> DbResult<Option<Thread>> {
        let thread =
            sqlx::query_as::<_, Thread>("SELECT * FROM threads WHERE id = ? AND owner_id = ?")
                .bind(id)
                .bind(owner_id)
                .fetch_optional(pool)
                .await?;
        Ok(thread)
    }

    /// Unscoped lookup, backing the read-only state/history endpoints.
    pub async fn get_unscoped(pool: &DatabasePool, id: &str) -> DbResult<Option<Thread>> {
        let thread = sqlx::query_as::<_, Thread>("SELECT * FROM threads WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(thread)
    }

    pub async fn list_by_owner(pool: &DatabasePool, owner_id: &str) -> DbResult<Vec<Thread>> {
        let threads = sqlx::query_as::<_, Thread>(
            "SELECT * FROM threads WHERE owner_id = ? ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await?;
        Ok(threads)
    }

    pub async fn patch(
        pool: &DatabasePool,
        id: &str,
        owner_id: &str,
        patch: ThreadPatch,
    ) -> DbResult<Thread> {
        let mut thread = Self::get(pool, id, owner_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found(format!("thread {}", id)))?;

        if let Some(metadata) = patch.metadata {
            thread.metadata = metadata.to_string();
        }
        if let Some(config) = patch.config {
            thread.config = config.to_string();
        }
        thread.updated_at = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE threads SET metadata = ?, config = ?, updated_at = ? WHERE id = ? AND owner_id = ?",
        )
        .bind(&thread.metadata)
        .bind(&thread.config)
        .bind(&thread.updated_at)
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;

        Ok(thread)
    }

    pub async fn delete(pool: &DatabasePool, id: &str, owner_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM threads WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Status transition, unscoped: the lifecycle engine already resolved
    /// ownership at admission.
    pub async fn set_status(pool: &DatabasePool, id: &str, status: &str) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE threads SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Persist the last known merged state.
    pub async fn set_values(
        pool: &DatabasePool,
        id: &str,
        values: &serde_json::Value,
    ) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE threads SET values_json = ?, updated_at = ? WHERE id = ?")
            .bind(values.to_string())
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::thread::status;
    use crate::db::DatabaseConnection;

    #[tokio::test]
    async fn test_create_get_and_status_cycle() {
        let db = DatabaseConnection::for_tests().await;
        let thread = Thread::new("t1".to_string(), "alice".to_string());
        ThreadRepository::create(db.pool(), thread, IfExists::Raise)
            .await
            .unwrap();

        ThreadRepository::set_status(db.pool(), "t1", status::BUSY)
            .await
            .unwrap();
        let t = ThreadRepository::get(db.pool(), "t1", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.status, status::BUSY);

        ThreadRepository::set_status(db.pool(), "t1", status::IDLE)
            .await
            .unwrap();
        let t = ThreadRepository::get_unscoped(db.pool(), "t1").await.unwrap().unwrap();
        assert_eq!(t.status, status::IDLE);
    }

    #[tokio::test]
    async fn test_set_values_round_trip() {
        let db = DatabaseConnection::for_tests().await;
        ThreadRepository::create(
            db.pool(),
            Thread::new("t1".to_string(), "alice".to_string()),
            IfExists::Raise,
        )
        .await
        .unwrap();

        let values = serde_json::json!({"messages": [{"role": "user", "content": "hi"}]});
        ThreadRepository::set_values(db.pool(), "t1", &values).await.unwrap();

        let t = ThreadRepository::get(db.pool(), "t1", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.values(), values);
    }
}
