//! Run repository.

use crate::db::connection::DatabasePool;
use crate::db::error::DbResult;
use crate::db::models::Run;
use chrono::Utc;

/// Run repository.
pub struct RunRepository;

impl RunRepository {
    pub async fn create(pool: &DatabasePool, run: Run) -> DbResult<Run> {
        sqlx::query(
            "INSERT INTO runs
                (id, thread_id, assistant_id, owner_id, status, multitask_strategy, kwargs, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.id)
        .bind(&run.thread_id)
        .bind(&run.assistant_id)
        .bind(&run.owner_id)
        .bind(&run.status)
        .bind(&run.multitask_strategy)
        .bind(&run.kwargs)
        .bind(&run.metadata)
        .bind(&run.created_at)
        .bind(&run.updated_at)
        .execute(pool)
        .await?;
        Ok(run)
    }

    pub async fn get(
        pool: &DatabasePool,
        thread_id: &str,
        run_id: &str,
        owner_id: &str,
    ) -> DbResult<Option<Run>> {
        let run = sqlx::query_as::<_, Run>(
            "SELECT * FROM runs WHERE id = ? AND thread_id = ? AND owner_id = ?",
        )
        .bind(run_id)
        .bind(thread_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;
        Ok(run)
    }

    pub async fn get_by_id(pool: &DatabasePool, run_id: &str) -> DbResult<Option<Run>> {
        let run = sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(pool)
            .await?;
        Ok(run)
    }

    pub async fn list_by_thread(
        pool: &DatabasePool,
        thread_id: &str,
        owner_id: &str,
    ) -> DbResult<Vec<Run>> {
        let runs = sqlx::query_as::<_, Run>(
            "SELECT * FROM runs WHERE thread_id = ? AND owner_id = ? ORDER BY created_at DESC",
        )
        .bind(thread_id)
        .bind(owner_id)
        .fetch_all(pool)
        .await?;
        Ok(runs)
    }

    /// The most recent non-terminal run on the thread, if any. Drives the
    /// multitask policy: a thread holds at most one active run.
    pub async fn get_active(
        pool: &DatabasePool,
        thread_id: &str,
        owner_id: &str,
    ) -> DbResult<Option<Run>> {
        let run = sqlx::query_as::<_, Run>(
            "SELECT * FROM runs
             WHERE thread_id = ? AND owner_id = ? AND status IN ('pending', 'running')
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(thread_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;
        Ok(run)
    }

    /// One-way status transition; `updated_at` moves with it.
    pub async fn set_status(pool: &DatabasePool, run_id: &str, status: &str) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE runs SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(&now)
            .bind(run_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(
        pool: &DatabasePool,
        thread_id: &str,
        run_id: &str,
        owner_id: &str,
    ) -> DbResult<bool> {
        let result =
            sqlx::query("DELETE FROM runs WHERE id = ? AND thread_id = ? AND owner_id = ?")
                .bind(run_id)
                .bind(thread_id)
                .bind(owner_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::run::{status, MultitaskStrategy};
    use crate::db::DatabaseConnection;

    fn run(id: &str, thread: &str) -> Run {
        Run::new(
            id.to_string(),
            thread.to_string(),
            "a1".to_string(),
            "alice".to_string(),
            MultitaskStrategy::Reject,
        )
    }

    #[tokio::test]
    async fn test_get_active_prefers_latest_non_terminal() {
        let db = DatabaseConnection::for_tests().await;
        RunRepository::create(db.pool(), run("r1", "t1")).await.unwrap();
        RunRepository::set_status(db.pool(), "r1", status::SUCCESS)
            .await
            .unwrap();
        assert!(RunRepository::get_active(db.pool(), "t1", "alice")
            .await
            .unwrap()
            .is_none());

        RunRepository::create(db.pool(), run("r2", "t1")).await.unwrap();
        let active = RunRepository::get_active(db.pool(), "t1", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, "r2");
    }

    #[tokio::test]
    async fn test_owner_scoping_on_get() {
        let db = DatabaseConnection::for_tests().await;
        RunRepository::create(db.pool(), run("r1", "t1")).await.unwrap();
        assert!(RunRepository::get(db.pool(), "t1", "r1", "bob")
            .await
            .unwrap()
            .is_none());
        assert!(RunRepository::get(db.pool(), "t1", "r1", "alice")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_status_transition_updates_timestamp() {
        let db = DatabaseConnection::for_tests().await;
        let created = RunRepository::create(db.pool(), run("r1", "t1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        RunRepository::set_status(db.pool(), "r1", status::RUNNING)
            .await
            .unwrap();
        let updated = RunRepository::get_by_id(db.pool(), "r1").await.unwrap().unwrap();
        assert_eq!(updated.status, status::RUNNING);
        assert!(updated.updated_at >= created.updated_at);
    }
}
