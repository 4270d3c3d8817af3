//! Startup assistant sync from the external catalog.
//!
//! The catalog is a JSON array of assistant definitions. Synced assistants
//! are owned by the reserved `system` owner and keep their source-of-truth
//! UUIDs, so a re-sync is idempotent and checkpoint namespaces stay stable
//! across restarts. Sync failures log warnings and never abort startup.

use crate::config::{RuntimeConfig, SyncScope};
use crate::db::models::Assistant;
use crate::db::repositories::{AssistantRepository, IfExists};
use crate::db::DatabaseConnection;
use serde_json::Value;

/// Reserved owner for catalog-synced assistants.
pub const SYSTEM_OWNER: &str = "system";

fn assistant_from_catalog_entry(entry: &Value) -> Option<Assistant> {
    let id = entry.get("assistant_id").and_then(|v| v.as_str())?;
    let graph_id = entry
        .get("graph_id")
        .and_then(|v| v.as_str())
        .unwrap_or(crate::registry::DEFAULT_GRAPH_ID);

    let mut assistant = Assistant::new(
        id.to_string(),
        SYSTEM_OWNER.to_string(),
        graph_id.to_string(),
        entry
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
    );
    assistant.description = entry
        .get("description")
        .and_then(|v| v.as_str())
        .map(String::from);
    if let Some(config) = entry.get("config") {
        assistant.config = config.to_string();
    }
    if let Some(context) = entry.get("context") {
        assistant.context = context.to_string();
    }
    if let Some(metadata) = entry.get("metadata") {
        assistant.metadata = metadata.to_string();
    }
    Some(assistant)
}

fn in_scope(entry: &Value, scope: &SyncScope) -> bool {
    match scope {
        SyncScope::None => false,
        SyncScope::All => true,
        SyncScope::Org(org) => {
            entry
                .pointer("/metadata/org")
                .and_then(|v| v.as_str())
                .map(|entry_org| entry_org == org)
                .unwrap_or(false)
        }
    }
}

async fn fetch_catalog(catalog_url: &str) -> Result<Vec<Value>, String> {
    let response = reqwest::Client::new()
        .get(catalog_url)
        .send()
        .await
        .map_err(|e| format!("catalog unreachable: {}", e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("catalog returned status {}", status));
    }
    let body: Value = response
        .json()
        .await
        .map_err(|e| format!("catalog body unreadable: {}", e))?;
    body.as_array()
        .cloned()
        .ok_or_else(|| "catalog body is not an array".to_string())
}

/// Pull all in-scope assistants from the catalog. Runs once at startup.
pub async fn sync_assistants(db: &DatabaseConnection, config: &RuntimeConfig) -> usize {
    if config.sync_scope == SyncScope::None {
        return 0;
    }
    let Some(catalog_url) = &config.catalog_url else {
        tracing::warn!("AGENT_SYNC_SCOPE is set but AGENT_CATALOG_URL is not, skipping sync");
        return 0;
    };

    let entries = match fetch_catalog(catalog_url).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "assistant catalog sync failed");
            return 0;
        }
    };

    let mut synced = 0;
    for entry in entries {
        if !in_scope(&entry, &config.sync_scope) {
            continue;
        }
        let Some(assistant) = assistant_from_catalog_entry(&entry) else {
            tracing::warn!("catalog entry missing assistant_id, skipped");
            continue;
        };
        let id = assistant.id.clone();
        match AssistantRepository::create(db.pool(), assistant, IfExists::DoNothing).await {
            Ok(_) => synced += 1,
            Err(e) => tracing::warn!(assistant_id = %id, error = %e, "catalog assistant upsert failed"),
        }
    }
    tracing::info!(count = synced, "assistant catalog sync complete");
    synced
}

/// Dev-mode lazy sync of a single assistant by id.
pub async fn sync_assistant(
    db: &DatabaseConnection,
    config: &RuntimeConfig,
    assistant_id: &str,
) -> Result<bool, String> {
    let Some(catalog_url) = &config.catalog_url else {
        return Ok(false);
    };
    let entries = fetch_catalog(catalog_url).await?;
    for entry in entries {
        if entry.get("assistant_id").and_then(|v| v.as_str()) == Some(assistant_id) {
            let assistant = assistant_from_catalog_entry(&entry)
                .ok_or_else(|| "catalog entry unusable".to_string())?;
            AssistantRepository::create(db.pool(), assistant, IfExists::DoNothing)
                .await
                .map_err(|e| e.to_string())?;
            return Ok(true);
        }
    }
    Ok(false)
}
