//! Database connection management.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

/// Type alias for the database connection pool.
pub type DatabasePool = SqlitePool;

/// Shared handle to the repository pool.
///
/// This pool backs the CRUD repositories only. The checkpointer deliberately
/// does not use it: each run opens its own checkpoint connection so that
/// concurrent streams never serialize on a shared pool.
#[derive(Clone)]
pub struct DatabaseConnection {
    pool: Arc<DatabasePool>,
}

impl DatabaseConnection {
    /// Connect with the given pool size.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Connect an in-memory database for tests and run migrations.
    pub async fn for_tests() -> Self {
        let conn = Self::new("sqlite::memory:", 5)
            .await
            .expect("in-memory database");
        conn.run_migrations().await.expect("migrations");
        conn
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Apply embedded migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await
    }

    /// Simple liveness probe.
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").fetch_one(self.pool.as_ref()).await?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_connection_and_migrate() {
        let conn = DatabaseConnection::for_tests().await;
        assert!(conn.health_check().await.is_ok());

        // Migrations created the core tables.
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('assistants', 'threads', 'runs', 'store_items', 'crons')")
                .fetch_one(conn.pool())
                .await
                .unwrap();
        assert_eq!(count.0, 5);
    }
}
