//! Cron handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Identity;
use crate::api::models::{CronCreate, CronSearchRequest, CronView};
use crate::api::routes::AppState;
use crate::cron::next_fire;
use crate::db::models::cron::on_run_completed;
use crate::db::models::Cron;
use crate::db::repositories::CronRepository;

/// POST /runs/crons
pub async fn create_cron(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Json(req): Json<CronCreate>,
) -> ApiResult<Json<CronView>> {
    let next = next_fire(&req.schedule).map_err(ApiError::Validation)?;

    state
        .lifecycle
        .resolve_assistant(&req.assistant_id, &owner)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("Assistant {} not found", req.assistant_id)))?;

    let on_completed = req
        .on_run_completed
        .unwrap_or_else(|| on_run_completed::KEEP.to_string());
    if on_completed != on_run_completed::KEEP && on_completed != on_run_completed::DELETE {
        return Err(ApiError::validation(
            "on_run_completed must be 'keep' or 'delete'",
        ));
    }

    let mut cron = Cron::new(
        Uuid::new_v4().to_string(),
        owner,
        req.assistant_id,
        req.schedule,
    );
    cron.thread_id = req.thread_id;
    cron.end_time = req.end_time;
    cron.on_run_completed = on_completed;
    cron.next_run_date = Some(next.to_rfc3339());
    if let Some(payload) = req.payload {
        cron.payload = payload.to_string();
    }
    if let Some(metadata) = req.metadata {
        cron.metadata = metadata.to_string();
    }

    let created = CronRepository::create(state.db.pool(), cron).await?;
    state.scheduler.schedule(created.clone());
    tracing::info!(cron_id = %created.id, schedule = %created.schedule, "created cron");
    Ok(Json(CronView::from(&created)))
}

fn apply_filters(crons: Vec<Cron>, req: &CronSearchRequest) -> Vec<Cron> {
    crons
        .into_iter()
        .filter(|c| {
            if let Some(assistant_id) = &req.assistant_id {
                if c.assistant_id != *assistant_id {
                    return false;
                }
            }
            if let Some(thread_id) = &req.thread_id {
                if c.thread_id.as_deref() != Some(thread_id.as_str()) {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// POST /runs/crons/search
pub async fn search_crons(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Json(req): Json<CronSearchRequest>,
) -> ApiResult<Json<Vec<CronView>>> {
    let crons = CronRepository::list_by_owner(state.db.pool(), &owner).await?;
    let filtered = apply_filters(crons, &req);
    let offset = req.offset.unwrap_or(0);
    let limit = req.limit.unwrap_or(10);
    Ok(Json(
        filtered
            .iter()
            .skip(offset)
            .take(limit)
            .map(CronView::from)
            .collect(),
    ))
}

/// POST /runs/crons/count — bare integer.
pub async fn count_crons(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Json(req): Json<CronSearchRequest>,
) -> ApiResult<Json<usize>> {
    let crons = CronRepository::list_by_owner(state.db.pool(), &owner).await?;
    Ok(Json(apply_filters(crons, &req).len()))
}

/// GET /runs/crons/{cron_id}
pub async fn get_cron(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path(cron_id): Path<String>,
) -> ApiResult<Json<CronView>> {
    let cron = CronRepository::get(state.db.pool(), &cron_id, &owner)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Cron {} not found", cron_id)))?;
    Ok(Json(CronView::from(&cron)))
}

/// DELETE /runs/crons/{cron_id} — clears the timer, responds with `{}`.
pub async fn delete_cron(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path(cron_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = CronRepository::delete(state.db.pool(), &cron_id, &owner).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Cron {} not found", cron_id)));
    }
    state.scheduler.cancel(&cron_id);
    tracing::info!(cron_id = %cron_id, "deleted cron");
    Ok(Json(json!({})))
}
