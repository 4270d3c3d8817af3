//! Thread CRUD, search, state and history handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Identity;
use crate::api::models::{
    json_subset_matches, HistoryRequest, ThreadCreate, ThreadPatchRequest, ThreadSearchRequest,
    ThreadView,
};
use crate::api::routes::AppState;
use crate::db::models::Thread;
use crate::db::repositories::{StateSnapshotRepository, ThreadPatch, ThreadRepository};

/// POST /threads
pub async fn create_thread(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Json(req): Json<ThreadCreate>,
) -> ApiResult<Json<ThreadView>> {
    let mut thread = Thread::new(
        req.thread_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        owner,
    );
    if let Some(metadata) = req.metadata {
        thread.metadata = metadata.to_string();
    }
    let created = ThreadRepository::create(state.db.pool(), thread, req.if_exists).await?;
    tracing::info!(thread_id = %created.id, "created thread");
    Ok(Json(ThreadView::from(&created)))
}

fn apply_filters(threads: Vec<Thread>, req: &ThreadSearchRequest) -> Vec<Thread> {
    let mut filtered: Vec<Thread> = threads
        .into_iter()
        .filter(|t| {
            if let Some(status) = &req.status {
                if t.status != *status {
                    return false;
                }
            }
            if let Some(ids) = &req.ids {
                if !ids.contains(&t.id) {
                    return false;
                }
            }
            if let Some(metadata) = &req.metadata {
                if !json_subset_matches(metadata, &t.metadata_value()) {
                    return false;
                }
            }
            if let Some(values) = &req.values {
                if !json_subset_matches(values, &t.values()) {
                    return false;
                }
            }
            true
        })
        .collect();

    let descending = req.sort_order.as_deref() != Some("asc");
    match req.sort_by.as_deref() {
        Some("updated_at") => filtered.sort_by(|a, b| a.updated_at.cmp(&b.updated_at)),
        Some("status") => filtered.sort_by(|a, b| a.status.cmp(&b.status)),
        _ => filtered.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
    }
    if descending {
        filtered.reverse();
    }
    filtered
}

/// POST /threads/search
pub async fn search_threads(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Json(req): Json<ThreadSearchRequest>,
) -> ApiResult<Json<Vec<ThreadView>>> {
    let threads = ThreadRepository::list_by_owner(state.db.pool(), &owner).await?;
    let filtered = apply_filters(threads, &req);
    let offset = req.offset.unwrap_or(0);
    let limit = req.limit.unwrap_or(10);
    Ok(Json(
        filtered
            .iter()
            .skip(offset)
            .take(limit)
            .map(ThreadView::from)
            .collect(),
    ))
}

/// POST /threads/count — bare integer.
pub async fn count_threads(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Json(req): Json<ThreadSearchRequest>,
) -> ApiResult<Json<usize>> {
    let threads = ThreadRepository::list_by_owner(state.db.pool(), &owner).await?;
    Ok(Json(apply_filters(threads, &req).len()))
}

/// GET /threads/{id}
pub async fn get_thread(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<ThreadView>> {
    let thread = ThreadRepository::get(state.db.pool(), &thread_id, &owner)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Thread {} not found", thread_id)))?;
    Ok(Json(ThreadView::from(&thread)))
}

/// PATCH /threads/{id}
pub async fn patch_thread(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path(thread_id): Path<String>,
    Json(req): Json<ThreadPatchRequest>,
) -> ApiResult<Json<ThreadView>> {
    let patch = ThreadPatch {
        metadata: req.metadata,
        config: req.config,
    };
    let patched = ThreadRepository::patch(state.db.pool(), &thread_id, &owner, patch)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                ApiError::NotFound(format!("Thread {} not found", thread_id))
            } else {
                e.into()
            }
        })?;
    Ok(Json(ThreadView::from(&patched)))
}

/// DELETE /threads/{id} — responds with `{}`; snapshots go with the thread.
pub async fn delete_thread(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = ThreadRepository::delete(state.db.pool(), &thread_id, &owner).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Thread {} not found", thread_id)));
    }
    StateSnapshotRepository::delete_for_thread(state.db.pool(), &thread_id).await?;
    tracing::info!(thread_id = %thread_id, "deleted thread");
    Ok(Json(json!({})))
}

/// GET /threads/{id}/state
///
/// Deliberately unscoped: any caller with the thread id can read the
/// snapshot (downstream read-only services), but cannot list or mutate
/// without ownership.
pub async fn get_thread_state(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let thread = ThreadRepository::get_unscoped(state.db.pool(), &thread_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Thread {} not found", thread_id)))?;

    match StateSnapshotRepository::latest(state.db.pool(), &thread_id).await? {
        Some(snapshot) => Ok(Json(snapshot.to_api())),
        None => Ok(Json(json!({
            "values": thread.values(),
            "next": [],
            "config": {"thread_id": thread_id, "checkpoint_ns": "", "checkpoint_id": null},
        }))),
    }
}

fn validated_limit(limit: Option<i64>) -> ApiResult<i64> {
    match limit {
        None => Ok(10),
        Some(limit) if limit <= 0 => Err(ApiError::ValidationFields {
            message: "limit must be a positive integer".to_string(),
            fields: vec![json!({"field": "limit", "error": "must be >= 1"})],
        }),
        Some(limit) => Ok(limit),
    }
}

async fn history_response(
    state: &AppState,
    thread_id: &str,
    req: HistoryRequest,
) -> ApiResult<Json<serde_json::Value>> {
    ThreadRepository::get_unscoped(state.db.pool(), thread_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Thread {} not found", thread_id)))?;

    let limit = validated_limit(req.limit)?;
    let rows =
        StateSnapshotRepository::history(state.db.pool(), thread_id, limit, req.before.as_deref())
            .await?;
    let snapshots: Vec<serde_json::Value> = rows.iter().map(|row| row.to_api()).collect();
    Ok(Json(json!(snapshots)))
}

/// GET /threads/{id}/history — unscoped like the state endpoint.
pub async fn get_thread_history(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Query(req): Query<HistoryRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    history_response(&state, &thread_id, req).await
}

/// POST /threads/{id}/history — same response as GET, body-borne params.
pub async fn post_thread_history(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(req): Json<HistoryRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    history_response(&state, &thread_id, req).await
}
