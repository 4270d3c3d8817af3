//! Store handlers.
//!
//! PUT and search receive the namespace in the body (list or string form);
//! GET and DELETE receive the slash-joined string form as a query
//! parameter. All four normalize through the same helper before touching
//! storage.

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Identity;
use crate::api::models::{StoreDeleteQuery, StoreGetQuery, StorePutRequest, StoreSearchRequest};
use crate::api::routes::AppState;
use crate::store::{normalize_namespace, split_namespace};
use agent_graph::store::StoreItem;

fn item_to_api(item: &StoreItem) -> serde_json::Value {
    json!({
        "namespace": item.namespace,
        "key": item.key,
        "value": item.value,
        "created_at": item.created_at.to_rfc3339(),
        "updated_at": item.updated_at.to_rfc3339(),
    })
}

/// PUT /store/items — upsert, `200 {}` regardless of prior existence.
pub async fn put_item(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Json(req): Json<StorePutRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if req.key.is_empty() {
        return Err(ApiError::validation("key must not be empty"));
    }
    let namespace = normalize_namespace(req.namespace.as_ref()).map_err(ApiError::Validation)?;
    state
        .store
        .put(&owner, &namespace, &req.key, req.value)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({})))
}

/// GET /store/items?namespace=a/b&key=k
pub async fn get_item(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Query(query): Query<StoreGetQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let namespace = split_namespace(query.namespace.as_deref().unwrap_or(""));
    let item = state
        .store
        .get(&owner, &namespace, &query.key)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::NotFound("Item not found".to_string()))?;
    Ok(Json(item_to_api(&item)))
}

/// DELETE /store/items?namespace=a/b&key=k — `{}` on delete, 404 on miss.
pub async fn delete_item(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Query(query): Query<StoreDeleteQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let namespace = split_namespace(query.namespace.as_deref().unwrap_or(""));
    let deleted = state
        .store
        .delete(&owner, &namespace, &query.key)
        .await
        .map_err(ApiError::internal)?;
    if !deleted {
        return Err(ApiError::NotFound("Item not found".to_string()));
    }
    Ok(Json(json!({})))
}

/// POST /store/items/search — the prefix field is named `namespace`.
pub async fn search_items(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Json(req): Json<StoreSearchRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let prefix = normalize_namespace(req.namespace.as_ref()).map_err(ApiError::Validation)?;
    let items = state
        .store
        .search(
            &owner,
            &prefix,
            req.limit.unwrap_or(10),
            req.offset.unwrap_or(0),
        )
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({
        "items": items.iter().map(item_to_api).collect::<Vec<_>>(),
    })))
}

/// GET /store/namespaces
pub async fn list_namespaces(
    State(state): State<AppState>,
    Identity(owner): Identity,
) -> ApiResult<Json<serde_json::Value>> {
    let namespaces = state
        .store
        .list_namespaces(&owner)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({"namespaces": namespaces})))
}
