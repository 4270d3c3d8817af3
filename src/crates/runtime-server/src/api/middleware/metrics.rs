//! Process metrics: request and run counters.

use axum::{extract::{Request, State}, middleware::Next, response::Response};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters, exposed at `/metrics` and `/metrics/json`.
#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_failed: AtomicU64,
    pub runs_started: AtomicU64,
    pub runs_succeeded: AtomicU64,
    pub runs_failed: AtomicU64,
    pub runs_interrupted: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_run_outcome(&self, status: &str) {
        match status {
            crate::db::models::run::status::SUCCESS => {
                self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
            }
            crate::db::models::run::status::INTERRUPTED => {
                self.runs_interrupted.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.runs_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "requests_total": self.requests_total.load(Ordering::Relaxed),
            "requests_failed": self.requests_failed.load(Ordering::Relaxed),
            "runs_started": self.runs_started.load(Ordering::Relaxed),
            "runs_succeeded": self.runs_succeeded.load(Ordering::Relaxed),
            "runs_failed": self.runs_failed.load(Ordering::Relaxed),
            "runs_interrupted": self.runs_interrupted.load(Ordering::Relaxed),
        })
    }
}

/// Count every request and every non-2xx response.
pub async fn metrics_middleware(
    State(state): State<crate::api::routes::AppState>,
    request: Request,
    next: Next,
) -> Response {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    let response = next.run(request).await;
    if !response.status().is_success() {
        state.metrics.requests_failed.fetch_add(1, Ordering::Relaxed);
    }
    response
}
