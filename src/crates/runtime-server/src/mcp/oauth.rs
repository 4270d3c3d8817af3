//! OAuth token exchange for MCP servers that require auth.
//!
//! The caller's bearer token is exchanged for a server-scoped token via the
//! server's token-exchange endpoint. Exchanged tokens are cached in the
//! store under the runtime-internal owner, namespaced per user and server,
//! so user data can never collide with the cache.

use crate::store::INTERNAL_OWNER;
use agent_graph::store::AgentStore;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Cached tokens are reused for this long.
pub const TOKEN_TTL_SECS: i64 = 300;

fn cache_namespace(user_id: &str, server_name: &str) -> Vec<String> {
    vec![
        user_id.to_string(),
        "oauth".to_string(),
        server_name.to_string(),
    ]
}

/// Exchange (or reuse) a server-scoped token for `user_id` at `server_url`.
pub async fn exchange_token(
    client: &reqwest::Client,
    server_url: &str,
    server_name: &str,
    user_id: &str,
    bearer_token: &str,
    store: Arc<dyn AgentStore>,
) -> Result<String, String> {
    let namespace = cache_namespace(user_id, server_name);

    if let Ok(Some(item)) = store.get(INTERNAL_OWNER, &namespace, "token").await {
        let fresh = item
            .value
            .get("fetched_at")
            .and_then(|v| v.as_str())
            .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| (Utc::now() - t.with_timezone(&Utc)).num_seconds() < TOKEN_TTL_SECS)
            .unwrap_or(false);
        if fresh {
            if let Some(token) = item.value.get("token").and_then(|v| v.as_str()) {
                tracing::debug!(server = %server_name, "MCP token cache hit");
                return Ok(token.to_string());
            }
        }
    }

    let exchange_url = format!("{}/oauth/token-exchange", server_url.trim_end_matches('/'));
    let response = client
        .post(&exchange_url)
        .bearer_auth(bearer_token)
        .json(&json!({"grant_type": "token-exchange"}))
        .send()
        .await
        .map_err(|e| format!("token exchange request failed: {}", e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("token exchange returned status {}", status));
    }

    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| format!("token exchange body unreadable: {}", e))?;
    let token = body
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "token exchange response missing access_token".to_string())?
        .to_string();

    let cached = json!({
        "token": token,
        "fetched_at": Utc::now().to_rfc3339(),
    });
    if let Err(e) = store.put(INTERNAL_OWNER, &namespace, "token", cached).await {
        tracing::warn!(server = %server_name, error = %e, "failed to cache MCP token");
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_graph::store::InMemoryStore;

    #[tokio::test]
    async fn cache_hit_skips_exchange() {
        let store: Arc<dyn AgentStore> = Arc::new(InMemoryStore::new());
        let namespace = cache_namespace("alice", "search");
        store
            .put(
                INTERNAL_OWNER,
                &namespace,
                "token",
                json!({"token": "cached-token", "fetched_at": Utc::now().to_rfc3339()}),
            )
            .await
            .unwrap();

        // The server URL is unreachable; a cache miss would error.
        let client = reqwest::Client::new();
        let token = exchange_token(
            &client,
            "http://127.0.0.1:1/mcp",
            "search",
            "alice",
            "caller-bearer",
            store,
        )
        .await
        .unwrap();
        assert_eq!(token, "cached-token");
    }

    #[tokio::test]
    async fn stale_cache_is_not_used() {
        let store: Arc<dyn AgentStore> = Arc::new(InMemoryStore::new());
        let namespace = cache_namespace("alice", "search");
        let stale = (Utc::now() - chrono::Duration::seconds(TOKEN_TTL_SECS + 10)).to_rfc3339();
        store
            .put(
                INTERNAL_OWNER,
                &namespace,
                "token",
                json!({"token": "stale-token", "fetched_at": stale}),
            )
            .await
            .unwrap();

        let client = reqwest::Client::new();
        let result = exchange_token(
            &client,
            "http://127.0.0.1:1/mcp",
            "search",
            "alice",
            "caller-bearer",
            store,
        )
        .await;
        // Exchange was attempted (and failed against the dead endpoint).
        assert!(result.is_err());
    }
}
