//! Public endpoints: root, health, info, OpenAPI stub, docs, metrics.

use axum::{extract::State, response::Html, Json};
use serde_json::json;

use crate::api::routes::AppState;

/// GET /
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "runtime-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = state.db.health_check().await.is_ok();
    Json(json!({"status": if database { "ok" } else { "degraded" }, "database": database}))
}

/// GET /ok
pub async fn ok() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

/// GET /info — advertises capabilities (available graphs, feature flags).
pub async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "graph_ids": state.registry.graph_ids(),
        "flags": {
            "assistants": true,
            "crons": true,
            "store": true,
            "auth": state.config.identity.is_some(),
        }
    }))
}

/// GET /openapi.json — mechanical skeleton; the path list is the contract.
pub async fn openapi() -> Json<serde_json::Value> {
    Json(json!({
        "openapi": "3.1.0",
        "info": {
            "title": "Agent Runtime Server",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": {}
    }))
}

/// GET /docs
pub async fn docs() -> Html<&'static str> {
    Html("<html><body><h1>Agent Runtime Server</h1><p>See <a href=\"/openapi.json\">openapi.json</a>.</p></body></html>")
}

/// GET /metrics and /metrics/json
pub async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.metrics.snapshot())
}
