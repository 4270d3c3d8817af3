//! Assistant CRUD and search handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Identity;
use crate::api::models::{
    json_subset_matches, AssistantCreate, AssistantPatchRequest, AssistantSearchRequest,
    AssistantView,
};
use crate::api::routes::AppState;
use crate::db::models::Assistant;
use crate::db::repositories::{AssistantPatch, AssistantRepository};
use crate::sync::SYSTEM_OWNER;

/// POST /assistants
pub async fn create_assistant(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Json(req): Json<AssistantCreate>,
) -> ApiResult<Json<AssistantView>> {
    if req.graph_id.is_empty() {
        return Err(ApiError::validation("graph_id must not be empty"));
    }

    let mut assistant = Assistant::new(
        req.assistant_id
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        owner,
        req.graph_id,
        req.name.unwrap_or_default(),
    );
    assistant.description = req.description;
    if let Some(config) = req.config {
        assistant.config = config.to_string();
    }
    if let Some(context) = req.context {
        assistant.context = context.to_string();
    }
    if let Some(metadata) = req.metadata {
        assistant.metadata = metadata.to_string();
    }

    let created = AssistantRepository::create(state.db.pool(), assistant, req.if_exists).await?;
    tracing::info!(assistant_id = %created.id, "created assistant");
    Ok(Json(AssistantView::from(&created)))
}

/// Assistants the caller can see: their own plus system-synced ones.
async fn visible_assistants(state: &AppState, owner: &str) -> ApiResult<Vec<Assistant>> {
    let mut assistants = AssistantRepository::list_by_owner(state.db.pool(), owner).await?;
    if owner != SYSTEM_OWNER {
        assistants
            .extend(AssistantRepository::list_by_owner(state.db.pool(), SYSTEM_OWNER).await?);
    }
    Ok(assistants)
}

fn apply_filters(assistants: Vec<Assistant>, req: &AssistantSearchRequest) -> Vec<Assistant> {
    let mut filtered: Vec<Assistant> = assistants
        .into_iter()
        .filter(|a| {
            if let Some(graph_id) = &req.graph_id {
                if a.graph_id != *graph_id {
                    return false;
                }
            }
            if let Some(name) = &req.name {
                if a.name != *name {
                    return false;
                }
            }
            if let Some(ids) = &req.ids {
                if !ids.contains(&a.id) {
                    return false;
                }
            }
            if let Some(metadata) = &req.metadata {
                if !json_subset_matches(metadata, &a.metadata_value()) {
                    return false;
                }
            }
            true
        })
        .collect();

    let descending = req.sort_order.as_deref() != Some("asc");
    match req.sort_by.as_deref() {
        Some("name") => filtered.sort_by(|a, b| a.name.cmp(&b.name)),
        Some("version") => filtered.sort_by_key(|a| a.version),
        Some("updated_at") => filtered.sort_by(|a, b| a.updated_at.cmp(&b.updated_at)),
        _ => filtered.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
    }
    if descending {
        filtered.reverse();
    }
    filtered
}

/// POST /assistants/search
pub async fn search_assistants(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Json(req): Json<AssistantSearchRequest>,
) -> ApiResult<Json<Vec<AssistantView>>> {
    let filtered = apply_filters(visible_assistants(&state, &owner).await?, &req);
    let offset = req.offset.unwrap_or(0);
    let limit = req.limit.unwrap_or(10);
    Ok(Json(
        filtered
            .iter()
            .skip(offset)
            .take(limit)
            .map(AssistantView::from)
            .collect(),
    ))
}

/// POST /assistants/count — response body is the bare integer.
pub async fn count_assistants(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Json(req): Json<AssistantSearchRequest>,
) -> ApiResult<Json<usize>> {
    let filtered = apply_filters(visible_assistants(&state, &owner).await?, &req);
    Ok(Json(filtered.len()))
}

/// GET /assistants/{id}
pub async fn get_assistant(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path(assistant_id): Path<String>,
) -> ApiResult<Json<AssistantView>> {
    let assistant = state
        .lifecycle
        .resolve_assistant(&assistant_id, &owner)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("Assistant {} not found", assistant_id)))?;
    Ok(Json(AssistantView::from(&assistant)))
}

/// PATCH /assistants/{id} — bumps the version.
pub async fn patch_assistant(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path(assistant_id): Path<String>,
    Json(req): Json<AssistantPatchRequest>,
) -> ApiResult<Json<AssistantView>> {
    let patch = AssistantPatch {
        graph_id: req.graph_id,
        name: req.name,
        description: req.description,
        config: req.config,
        context: req.context,
        metadata: req.metadata,
    };
    let patched = AssistantRepository::patch(state.db.pool(), &assistant_id, &owner, patch)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                ApiError::NotFound(format!("Assistant {} not found", assistant_id))
            } else {
                e.into()
            }
        })?;
    tracing::info!(assistant_id = %patched.id, version = patched.version, "patched assistant");
    Ok(Json(AssistantView::from(&patched)))
}

/// DELETE /assistants/{id} — responds with `{}`.
pub async fn delete_assistant(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path(assistant_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = AssistantRepository::delete(state.db.pool(), &assistant_id, &owner).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!(
            "Assistant {} not found",
            assistant_id
        )));
    }
    tracing::info!(assistant_id = %assistant_id, "deleted assistant");
    Ok(Json(json!({})))
}
