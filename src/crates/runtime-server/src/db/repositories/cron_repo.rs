//! Cron repository.

use crate::db::connection::DatabasePool;
use crate::db::error::DbResult;
use crate::db::models::Cron;
use chrono::Utc;

/// Cron repository.
pub struct CronRepository;

impl CronRepository {
    pub async fn create(pool: &DatabasePool, cron: Cron) -> DbResult<Cron> {
        sqlx::query(
            "INSERT INTO crons
                (id, owner_id, assistant_id, thread_id, schedule, payload, end_time, next_run_date, on_run_completed, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&cron.id)
        .bind(&cron.owner_id)
        .bind(&cron.assistant_id)
        .bind(&cron.thread_id)
        .bind(&cron.schedule)
        .bind(&cron.payload)
        .bind(&cron.end_time)
        .bind(&cron.next_run_date)
        .bind(&cron.on_run_completed)
        .bind(&cron.metadata)
        .bind(&cron.created_at)
        .bind(&cron.updated_at)
        .execute(pool)
        .await?;
        Ok(cron)
    }

    pub async fn get(pool: &DatabasePool, id: &str, owner_id: &str) -> DbResult<Option<Cron>> {
        let cron = sqlx::query_as::<_, Cron>("SELECT * FROM crons WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await?;
        Ok(cron)
    }

    pub async fn list_by_owner(pool: &DatabasePool, owner_id: &str) -> DbResult<Vec<Cron>> {
        let crons = sqlx::query_as::<_, Cron>(
            "SELECT * FROM crons WHERE owner_id = ? ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await?;
        Ok(crons)
    }

    /// All crons, used to restore timers at startup.
    pub async fn list_all(pool: &DatabasePool) -> DbResult<Vec<Cron>> {
        let crons = sqlx::query_as::<_, Cron>("SELECT * FROM crons ORDER BY created_at")
            .fetch_all(pool)
            .await?;
        Ok(crons)
    }

    pub async fn set_next_run_date(
        pool: &DatabasePool,
        id: &str,
        next_run_date: Option<&str>,
    ) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE crons SET next_run_date = ?, updated_at = ? WHERE id = ?")
            .bind(next_run_date)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(pool: &DatabasePool, id: &str, owner_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM crons WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Unscoped delete for self-removal after a final fire.
    pub async fn delete_by_id(pool: &DatabasePool, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM crons WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseConnection;

    #[tokio::test]
    async fn test_create_get_delete() {
        let db = DatabaseConnection::for_tests().await;
        let cron = Cron::new(
            "c1".to_string(),
            "alice".to_string(),
            "a1".to_string(),
            "0 0 * * * *".to_string(),
        );
        CronRepository::create(db.pool(), cron).await.unwrap();

        assert!(CronRepository::get(db.pool(), "c1", "bob").await.unwrap().is_none());
        let fetched = CronRepository::get(db.pool(), "c1", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.schedule, "0 0 * * * *");

        CronRepository::set_next_run_date(db.pool(), "c1", Some("2026-01-01T00:00:00Z"))
            .await
            .unwrap();
        let fetched = CronRepository::get(db.pool(), "c1", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.next_run_date.as_deref(), Some("2026-01-01T00:00:00Z"));

        assert!(CronRepository::delete(db.pool(), "c1", "alice").await.unwrap());
    }
}
