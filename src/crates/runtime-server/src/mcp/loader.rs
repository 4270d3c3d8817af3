//! MCP server configuration parsing, tool fetching and adaptation.

use crate::mcp::oauth::exchange_token;
use agent_graph::store::AgentStore;
use agent_graph::{GraphError, Tool};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const MCP_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One configured MCP server.
#[derive(Debug, Clone)]
pub struct McpServer {
    pub name: String,
    pub url: String,
    pub auth_required: bool,
    /// Allowlist; empty means every tool the server exposes.
    pub tools: Vec<String>,
}

/// Trim trailing slashes and ensure the `/mcp` suffix.
pub fn normalize_server_url(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    if trimmed.ends_with("/mcp") {
        trimmed.to_string()
    } else {
        format!("{}/mcp", trimmed)
    }
}

/// Parse `configurable.mcp_config.servers`, which may be a list of server
/// objects or a map of name to server object.
fn parse_servers(mcp_config: &Value) -> Vec<McpServer> {
    let Some(servers) = mcp_config.get("servers") else {
        return Vec::new();
    };

    let entries: Vec<(String, &Value)> = match servers {
        Value::Array(list) => list
            .iter()
            .enumerate()
            .map(|(i, server)| {
                let name = server
                    .get("name")
                    .and_then(|n| n.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| format!("server-{}", i + 1));
                (name, server)
            })
            .collect(),
        Value::Object(map) => map.iter().map(|(name, server)| (name.clone(), server)).collect(),
        _ => return Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(|(name, server)| {
            let url = server.get("url").and_then(|u| u.as_str())?;
            Some(McpServer {
                name,
                url: normalize_server_url(url),
                auth_required: server
                    .get("auth_required")
                    .and_then(|a| a.as_bool())
                    .unwrap_or(false),
                tools: server
                    .get("tools")
                    .and_then(|t| t.as_array())
                    .map(|list| {
                        list.iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// A remote MCP tool adapted to the graph tool protocol.
struct McpTool {
    name: String,
    remote_name: String,
    description: String,
    schema: Value,
    server_url: String,
    server_token: Option<String>,
    client: reqwest::Client,
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Value {
        self.schema.clone()
    }

    async fn call(&self, args: Value) -> agent_graph::Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": self.remote_name, "arguments": args},
        });
        let mut builder = self.client.post(&self.server_url).json(&request);
        if let Some(token) = &self.server_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| GraphError::tool(format!("MCP call failed: {}", e)))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| GraphError::tool(format!("MCP response unreadable: {}", e)))?;

        if let Some(error) = body.get("error") {
            return Err(GraphError::tool(format!("MCP error: {}", error)));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// JSON-RPC `tools/list` against one server.
async fn fetch_tool_definitions(
    client: &reqwest::Client,
    server_url: &str,
    token: Option<&str>,
) -> Result<Vec<Value>, String> {
    let request = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
    let mut builder = client.post(server_url).json(&request);
    if let Some(token) = token {
        builder = builder.bearer_auth(token);
    }
    let response = builder
        .send()
        .await
        .map_err(|e| format!("unreachable: {}", e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("tools/list returned status {}", status));
    }
    let body: Value = response
        .json()
        .await
        .map_err(|e| format!("tools/list body unreadable: {}", e))?;
    if let Some(error) = body.get("error") {
        return Err(format!("tools/list error: {}", error));
    }
    Ok(body
        .pointer("/result/tools")
        .and_then(|t| t.as_array())
        .cloned()
        .unwrap_or_default())
}

/// Pick a unique tool name: duplicates get a `-2`, `-3`, ... suffix. Tools
/// are never silently dropped.
fn disambiguate(name: &str, taken: &HashMap<String, usize>) -> String {
    match taken.get(name) {
        None => name.to_string(),
        Some(n) => format!("{}-{}", name, n + 1),
    }
}

/// Load tools from every configured server. A failing server logs a warning
/// and contributes nothing; the agent runs with the remaining tools.
pub async fn load_tools(
    mcp_config: &Value,
    bearer_token: Option<&str>,
    owner_id: &str,
    store: Arc<dyn AgentStore>,
) -> Vec<Arc<dyn Tool>> {
    let servers = parse_servers(mcp_config);
    if servers.is_empty() {
        return Vec::new();
    }

    let client = reqwest::Client::builder()
        .timeout(MCP_REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default();

    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
    let mut taken: HashMap<String, usize> = HashMap::new();

    for server in servers {
        let server_token = if server.auth_required {
            let Some(bearer) = bearer_token else {
                tracing::warn!(server = %server.name, "MCP server requires auth but request carries no bearer token, skipping");
                continue;
            };
            match exchange_token(
                &client,
                &server.url,
                &server.name,
                owner_id,
                bearer,
                store.clone(),
            )
            .await
            {
                Ok(token) => Some(token),
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "MCP token exchange failed, skipping server");
                    continue;
                }
            }
        } else {
            None
        };

        let definitions =
            match fetch_tool_definitions(&client, &server.url, server_token.as_deref()).await {
                Ok(defs) => defs,
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "MCP tool fetch failed, continuing without its tools");
                    continue;
                }
            };

        for def in definitions {
            let Some(remote_name) = def.get("name").and_then(|n| n.as_str()) else {
                continue;
            };
            if !server.tools.is_empty() && !server.tools.iter().any(|t| t == remote_name) {
                continue;
            }
            let name = disambiguate(remote_name, &taken);
            *taken.entry(remote_name.to_string()).or_insert(0) += 1;

            tools.push(Arc::new(McpTool {
                name,
                remote_name: remote_name.to_string(),
                description: def
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default()
                    .to_string(),
                schema: def
                    .get("inputSchema")
                    .cloned()
                    .unwrap_or_else(|| json!({"type": "object"})),
                server_url: server.url.clone(),
                server_token: server_token.clone(),
                client: client.clone(),
            }));
        }
        tracing::info!(server = %server.name, tools = tools.len(), "loaded MCP tools");
    }

    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_normalization() {
        assert_eq!(normalize_server_url("https://x.dev/"), "https://x.dev/mcp");
        assert_eq!(normalize_server_url("https://x.dev/mcp"), "https://x.dev/mcp");
        assert_eq!(normalize_server_url("https://x.dev/mcp/"), "https://x.dev/mcp");
        assert_eq!(normalize_server_url("https://x.dev"), "https://x.dev/mcp");
    }

    #[test]
    fn parse_servers_accepts_list_and_map() {
        let from_list = parse_servers(&json!({
            "servers": [
                {"name": "search", "url": "https://a.dev", "auth_required": true},
                {"url": "https://b.dev", "tools": ["only_this"]}
            ]
        }));
        assert_eq!(from_list.len(), 2);
        assert_eq!(from_list[0].name, "search");
        assert!(from_list[0].auth_required);
        assert_eq!(from_list[1].name, "server-2");
        assert_eq!(from_list[1].tools, vec!["only_this"]);

        let from_map = parse_servers(&json!({
            "servers": {"search": {"url": "https://a.dev"}}
        }));
        assert_eq!(from_map.len(), 1);
        assert_eq!(from_map[0].name, "search");
        assert_eq!(from_map[0].url, "https://a.dev/mcp");
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let mut taken = HashMap::new();
        assert_eq!(disambiguate("lookup", &taken), "lookup");
        taken.insert("lookup".to_string(), 1);
        assert_eq!(disambiguate("lookup", &taken), "lookup-2");
        taken.insert("lookup".to_string(), 2);
        assert_eq!(disambiguate("lookup", &taken), "lookup-3");
    }

    #[tokio::test]
    async fn unreachable_server_contributes_nothing() {
        let store: Arc<dyn AgentStore> = Arc::new(agent_graph::store::InMemoryStore::new());
        let config = json!({"servers": [{"name": "dead", "url": "http://127.0.0.1:1"}]});
        let tools = load_tools(&config, None, "alice", store).await;
        assert!(tools.is_empty());
    }
}
