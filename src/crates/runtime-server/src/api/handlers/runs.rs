//! Run handlers: create, list, cancel, join, and the streaming endpoints
//! (stateful and stateless variants).

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue},
    response::Response,
    Json,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::{BearerToken, Identity};
use crate::api::models::{RunCreate, RunView};
use crate::api::routes::AppState;
use crate::db::models::Thread;
use crate::db::repositories::{IfExists, RunRepository, ThreadRepository};
use crate::execution::streaming::SseEvent;
use crate::execution::RunSubmission;

fn submission(
    req: RunCreate,
    thread_id: String,
    owner: String,
    bearer: Option<BearerToken>,
) -> RunSubmission {
    RunSubmission {
        thread_id,
        assistant_id: req.assistant_id,
        input: req.input,
        config: req.config,
        metadata: req.metadata,
        multitask_strategy: req.multitask_strategy,
        owner_id: owner,
        bearer_token: bearer.map(|b| b.0),
    }
}

/// Build a `text/event-stream` response from a stream of SSE frames.
fn sse_response<S>(frames: S) -> Response
where
    S: Stream<Item = String> + Send + 'static,
{
    let body = Body::from_stream(frames.map(|frame| Ok::<_, std::io::Error>(Bytes::from(frame))));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    // Disable reverse-proxy buffering so deltas reach the client promptly.
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Create an implicit thread for the stateless `/runs*` endpoints.
async fn implicit_thread(state: &AppState, owner: &str) -> ApiResult<String> {
    let thread = Thread::new(Uuid::new_v4().to_string(), owner.to_string());
    let thread_id = thread.id.clone();
    ThreadRepository::create(state.db.pool(), thread, IfExists::Raise).await?;
    Ok(thread_id)
}

/// POST /threads/{id}/runs — create a background run.
pub async fn create_run(
    State(state): State<AppState>,
    Identity(owner): Identity,
    bearer: Option<BearerToken>,
    Path(thread_id): Path<String>,
    Json(req): Json<RunCreate>,
) -> ApiResult<Json<RunView>> {
    let admitted = state
        .lifecycle
        .admit(submission(req, thread_id, owner, bearer))
        .await?;
    let view = RunView::from(&admitted.run);
    state.lifecycle.execute_background(admitted);
    Ok(Json(view))
}

/// GET /threads/{id}/runs
pub async fn list_runs(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<Vec<RunView>>> {
    let runs = RunRepository::list_by_thread(state.db.pool(), &thread_id, &owner).await?;
    Ok(Json(runs.iter().map(RunView::from).collect()))
}

/// GET /threads/{id}/runs/{run_id}
pub async fn get_run(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<RunView>> {
    let run = RunRepository::get(state.db.pool(), &thread_id, &run_id, &owner)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", run_id)))?;
    Ok(Json(RunView::from(&run)))
}

/// DELETE /threads/{id}/runs/{run_id} — only terminal runs can be deleted.
pub async fn delete_run(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let run = RunRepository::get(state.db.pool(), &thread_id, &run_id, &owner)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", run_id)))?;
    if !run.is_terminal() {
        return Err(ApiError::Conflict(
            "Run is still active; cancel it first".to_string(),
        ));
    }
    RunRepository::delete(state.db.pool(), &thread_id, &run_id, &owner).await?;
    state.lifecycle.broadcast().evict(&run_id);
    Ok(Json(json!({})))
}

/// POST /threads/{id}/runs/{run_id}/cancel — best-effort flag, `{}`.
pub async fn cancel_run(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    RunRepository::get(state.db.pool(), &thread_id, &run_id, &owner)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", run_id)))?;
    state.lifecycle.cancels().cancel(&run_id);
    tracing::info!(run_id = %run_id, "cancellation requested");
    Ok(Json(json!({})))
}

/// GET /threads/{id}/runs/{run_id}/join — block until terminal, return the
/// final state as JSON (no SSE).
pub async fn join_run(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let values = state
        .lifecycle
        .join_run(&thread_id, &run_id, &owner)
        .await?;
    Ok(Json(values))
}

/// GET /threads/{id}/runs/{run_id}/stream — reconnect to a run's stream:
/// replay buffered events, then follow live ones until `end`.
pub async fn stream_run_reconnect(
    State(state): State<AppState>,
    Identity(owner): Identity,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let run = RunRepository::get(state.db.pool(), &thread_id, &run_id, &owner)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", run_id)))?;

    let subscription = state.lifecycle.broadcast().subscribe(&run_id);
    let (snapshot, live) = match subscription {
        Some(parts) => parts,
        None => {
            // Channel gone (e.g. restart): synthesize the final events for
            // completed runs from persisted state.
            if !run.is_terminal() {
                return Err(ApiError::Conflict(
                    "Run stream is not available yet".to_string(),
                ));
            }
            let thread = ThreadRepository::get_unscoped(state.db.pool(), &thread_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Thread {} not found", thread_id)))?;
            let events = vec![
                SseEvent::metadata(&run_id, 1),
                SseEvent::values(thread.values()),
                SseEvent::end(&run_id, None, &run.status),
            ];
            (events, None)
        }
    };

    let frames = async_stream::stream! {
        for event in snapshot {
            yield event.frame();
        }
        if let Some(mut live) = live {
            loop {
                match live.recv().await {
                    Ok(event) => {
                        let is_end = event.name == "end";
                        yield event.frame();
                        if is_end {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(run_id = %run_id, skipped, "stream subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    };
    Ok(sse_response(frames))
}

/// POST /threads/{id}/runs/stream — create a run and stream it.
pub async fn create_run_stream(
    State(state): State<AppState>,
    Identity(owner): Identity,
    bearer: Option<BearerToken>,
    Path(thread_id): Path<String>,
    Json(req): Json<RunCreate>,
) -> ApiResult<Response> {
    let admitted = state
        .lifecycle
        .admit(submission(req, thread_id, owner, bearer))
        .await?;
    let events = state.lifecycle.execute_run_stream(admitted);
    Ok(sse_response(
        ReceiverStream::new(events).map(|event| event.frame()),
    ))
}

/// POST /threads/{id}/runs/wait — create a run, block, return final state.
pub async fn create_run_wait(
    State(state): State<AppState>,
    Identity(owner): Identity,
    bearer: Option<BearerToken>,
    Path(thread_id): Path<String>,
    Json(req): Json<RunCreate>,
) -> ApiResult<Json<serde_json::Value>> {
    let admitted = state
        .lifecycle
        .admit(submission(req, thread_id, owner, bearer))
        .await?;
    let values = state.lifecycle.execute_run_wait(admitted).await?;
    Ok(Json(values))
}

/// POST /runs — stateless background run on an implicit thread.
pub async fn create_stateless_run(
    State(state): State<AppState>,
    Identity(owner): Identity,
    bearer: Option<BearerToken>,
    Json(req): Json<RunCreate>,
) -> ApiResult<Json<RunView>> {
    let thread_id = implicit_thread(&state, &owner).await?;
    let admitted = state
        .lifecycle
        .admit(submission(req, thread_id, owner, bearer))
        .await?;
    let view = RunView::from(&admitted.run);
    state.lifecycle.execute_background(admitted);
    Ok(Json(view))
}

/// POST /runs/stream — stateless streaming run.
pub async fn create_stateless_run_stream(
    State(state): State<AppState>,
    Identity(owner): Identity,
    bearer: Option<BearerToken>,
    Json(req): Json<RunCreate>,
) -> ApiResult<Response> {
    let thread_id = implicit_thread(&state, &owner).await?;
    let admitted = state
        .lifecycle
        .admit(submission(req, thread_id, owner, bearer))
        .await?;
    let events = state.lifecycle.execute_run_stream(admitted);
    Ok(sse_response(
        ReceiverStream::new(events).map(|event| event.frame()),
    ))
}

/// POST /runs/wait — stateless blocking run.
pub async fn create_stateless_run_wait(
    State(state): State<AppState>,
    Identity(owner): Identity,
    bearer: Option<BearerToken>,
    Json(req): Json<RunCreate>,
) -> ApiResult<Json<serde_json::Value>> {
    let thread_id = implicit_thread(&state, &owner).await?;
    let admitted = state
        .lifecycle
        .admit(submission(req, thread_id, owner, bearer))
        .await?;
    let values = state.lifecycle.execute_run_wait(admitted).await?;
    Ok(Json(values))
}
