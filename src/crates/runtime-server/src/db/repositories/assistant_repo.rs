//! Assistant repository.

use crate::db::connection::DatabasePool;
use crate::db::error::{DatabaseError, DbResult};
use crate::db::models::Assistant;
use crate::db::repositories::IfExists;
use chrono::Utc;

/// Fields a PATCH may change. Every successful patch bumps `version`.
#[derive(Debug, Clone, Default)]
pub struct AssistantPatch {
    pub graph_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<serde_json::Value>,
    pub context: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

impl AssistantPatch {
    pub fn is_empty(&self) -> bool {
        self.graph_id.is_none()
            && self.name.is_none()
            && self.description.is_none()
            && self.config.is_none()
            && self.context.is_none()
            && self.metadata.is_none()
    }
}

/// Assistant repository.
pub struct AssistantRepository;

impl AssistantRepository {
    /// Insert an assistant, honoring the conflict policy. `DoNothing`
    /// returns the existing row without bumping its version.
    pub async fn create(
        pool: &DatabasePool,
        assistant: Assistant,
        if_exists: IfExists,
    ) -> DbResult<Assistant> {
        if let Some(existing) = Self::get_any_owner(pool, &assistant.id).await? {
            return match if_exists {
                IfExists::DoNothing if existing.owner_id == assistant.owner_id => Ok(existing),
                _ => Err(DatabaseError::ConstraintViolation(format!(
                    "assistant {} already exists",
                    assistant.id
                ))),
            };
        }

        sqlx::query(
            "INSERT INTO assistants
                (id, owner_id, graph_id, name, description, version, config, context, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&assistant.id)
        .bind(&assistant.owner_id)
        .bind(&assistant.graph_id)
        .bind(&assistant.name)
        .bind(&assistant.description)
        .bind(assistant.version)
        .bind(&assistant.config)
        .bind(&assistant.context)
        .bind(&assistant.metadata)
        .bind(&assistant.created_at)
        .bind(&assistant.updated_at)
        .execute(pool)
        .await?;

        Ok(assistant)
    }

    pub async fn get(pool: &DatabasePool, id: &str, owner_id: &str) -> DbResult<Option<Assistant>> {
        let assistant = sqlx::query_as::<_, Assistant>(
            "SELECT * FROM assistants WHERE id = ? AND owner_id = ?",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;
        Ok(assistant)
    }

    /// Unfiltered lookup, used for conflict detection and startup sync.
    pub async fn get_any_owner(pool: &DatabasePool, id: &str) -> DbResult<Option<Assistant>> {
        let assistant = sqlx::query_as::<_, Assistant>("SELECT * FROM assistants WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(assistant)
    }

    pub async fn list_by_owner(pool: &DatabasePool, owner_id: &str) -> DbResult<Vec<Assistant>> {
        let assistants = sqlx::query_as::<_, Assistant>(
            "SELECT * FROM assistants WHERE owner_id = ? ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await?;
        Ok(assistants)
    }

    /// Apply a patch and bump the version by exactly 1.
    pub async fn patch(
        pool: &DatabasePool,
        id: &str,
        owner_id: &str,
        patch: AssistantPatch,
    ) -> DbResult<Assistant> {
        let mut assistant = Self::get(pool, id, owner_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found(format!("assistant {}", id)))?;

        if let Some(graph_id) = patch.graph_id {
            assistant.graph_id = graph_id;
        }
        if let Some(name) = patch.name {
            assistant.name = name;
        }
        if let Some(description) = patch.description {
            assistant.description = Some(description);
        }
        if let Some(config) = patch.config {
            assistant.config = config.to_string();
        }
        if let Some(context) = patch.context {
            assistant.context = context.to_string();
        }
        if let Some(metadata) = patch.metadata {
            assistant.metadata = metadata.to_string();
        }
        assistant.version += 1;
        assistant.updated_at = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE assistants
             SET graph_id = ?, name = ?, description = ?, version = ?, config = ?, context = ?, metadata = ?, updated_at = ?
             WHERE id = ? AND owner_id = ?",
        )
        .bind(&assistant.graph_id)
        .bind(&assistant.name)
        .bind(&assistant.description)
        .bind(assistant.version)
        .bind(&assistant.config)
        .bind(&assistant.context)
        .bind(&assistant.metadata)
        .bind(&assistant.updated_at)
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;

        Ok(assistant)
    }

    /// Returns `true` when a row was deleted.
    pub async fn delete(pool: &DatabasePool, id: &str, owner_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM assistants WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseConnection;

    async fn setup() -> DatabaseConnection {
        DatabaseConnection::for_tests().await
    }

    fn assistant(id: &str, owner: &str) -> Assistant {
        Assistant::new(
            id.to_string(),
            owner.to_string(),
            "agent".to_string(),
            "test".to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_scoped() {
        let db = setup().await;
        AssistantRepository::create(db.pool(), assistant("a1", "alice"), IfExists::Raise)
            .await
            .unwrap();

        assert!(AssistantRepository::get(db.pool(), "a1", "alice")
            .await
            .unwrap()
            .is_some());
        assert!(AssistantRepository::get(db.pool(), "a1", "bob")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_create_raise_conflicts() {
        let db = setup().await;
        AssistantRepository::create(db.pool(), assistant("a1", "alice"), IfExists::Raise)
            .await
            .unwrap();
        let err = AssistantRepository::create(db.pool(), assistant("a1", "alice"), IfExists::Raise)
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[tokio::test]
    async fn test_create_do_nothing_returns_existing_without_version_bump() {
        let db = setup().await;
        AssistantRepository::create(db.pool(), assistant("a1", "alice"), IfExists::Raise)
            .await
            .unwrap();
        let again =
            AssistantRepository::create(db.pool(), assistant("a1", "alice"), IfExists::DoNothing)
                .await
                .unwrap();
        assert_eq!(again.id, "a1");
        assert_eq!(again.version, 1);
    }

    #[tokio::test]
    async fn test_patch_bumps_version_by_one() {
        let db = setup().await;
        AssistantRepository::create(db.pool(), assistant("a1", "alice"), IfExists::Raise)
            .await
            .unwrap();

        let patched = AssistantRepository::patch(
            db.pool(),
            "a1",
            "alice",
            AssistantPatch {
                name: Some("renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(patched.version, 2);
        assert_eq!(patched.name, "renamed");

        let patched = AssistantRepository::patch(
            db.pool(),
            "a1",
            "alice",
            AssistantPatch {
                config: Some(serde_json::json!({"configurable": {"model": "openai:gpt-4o-mini"}})),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(patched.version, 3);
    }

    #[tokio::test]
    async fn test_patch_wrong_owner_is_not_found() {
        let db = setup().await;
        AssistantRepository::create(db.pool(), assistant("a1", "alice"), IfExists::Raise)
            .await
            .unwrap();
        let err = AssistantRepository::patch(
            db.pool(),
            "a1",
            "bob",
            AssistantPatch {
                name: Some("stolen".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_scoped() {
        let db = setup().await;
        AssistantRepository::create(db.pool(), assistant("a1", "alice"), IfExists::Raise)
            .await
            .unwrap();
        assert!(!AssistantRepository::delete(db.pool(), "a1", "bob").await.unwrap());
        assert!(AssistantRepository::delete(db.pool(), "a1", "alice").await.unwrap());
        assert!(AssistantRepository::get(db.pool(), "a1", "alice")
            .await
            .unwrap()
            .is_none());
    }
}
