//! API route definitions and shared application state.

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::api::middleware::{auth_middleware, metrics_middleware, Metrics};
use crate::config::RuntimeConfig;
use crate::cron::CronScheduler;
use crate::db::DatabaseConnection;
use crate::execution::RunLifecycle;
use crate::registry::GraphRegistry;
use crate::store::SqliteStore;
use agent_graph::store::AgentStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<RuntimeConfig>,
    pub registry: Arc<GraphRegistry>,
    pub store: Arc<dyn AgentStore>,
    pub lifecycle: Arc<RunLifecycle>,
    pub scheduler: Arc<CronScheduler>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Assemble the full application state around a connected database.
    pub fn new(
        db: DatabaseConnection,
        config: Arc<RuntimeConfig>,
        registry: Arc<GraphRegistry>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let store: Arc<dyn AgentStore> = Arc::new(SqliteStore::new(db.pool().clone()));
        let lifecycle = Arc::new(RunLifecycle::new(
            db.clone(),
            config.clone(),
            registry.clone(),
            store.clone(),
            metrics.clone(),
        ));
        let scheduler = Arc::new(CronScheduler::new(db.clone(), lifecycle.clone()));
        Self {
            db,
            config,
            registry,
            store,
            lifecycle,
            scheduler,
            metrics,
        }
    }

    /// State over an in-memory database, for tests.
    pub async fn for_tests(registry: Arc<GraphRegistry>) -> Self {
        let db = DatabaseConnection::for_tests().await;
        Self::new(db, Arc::new(RuntimeConfig::for_tests()), registry)
    }
}

/// Build the complete API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Public endpoints
        .route("/", get(handlers::system::root))
        .route("/health", get(handlers::system::health))
        .route("/ok", get(handlers::system::ok))
        .route("/info", get(handlers::system::info))
        .route("/openapi.json", get(handlers::system::openapi))
        .route("/docs", get(handlers::system::docs))
        .route("/metrics", get(handlers::system::metrics))
        .route("/metrics/json", get(handlers::system::metrics))
        // Assistants
        .route("/assistants", post(handlers::assistants::create_assistant))
        .route(
            "/assistants/search",
            post(handlers::assistants::search_assistants),
        )
        .route(
            "/assistants/count",
            post(handlers::assistants::count_assistants),
        )
        .route(
            "/assistants/:assistant_id",
            get(handlers::assistants::get_assistant)
                .patch(handlers::assistants::patch_assistant)
                .delete(handlers::assistants::delete_assistant),
        )
        // Threads
        .route("/threads", post(handlers::threads::create_thread))
        .route("/threads/search", post(handlers::threads::search_threads))
        .route("/threads/count", post(handlers::threads::count_threads))
        .route(
            "/threads/:thread_id",
            get(handlers::threads::get_thread)
                .patch(handlers::threads::patch_thread)
                .delete(handlers::threads::delete_thread),
        )
        .route(
            "/threads/:thread_id/state",
            get(handlers::threads::get_thread_state),
        )
        .route(
            "/threads/:thread_id/history",
            get(handlers::threads::get_thread_history)
                .post(handlers::threads::post_thread_history),
        )
        // Runs (stateful)
        .route(
            "/threads/:thread_id/runs",
            post(handlers::runs::create_run).get(handlers::runs::list_runs),
        )
        .route(
            "/threads/:thread_id/runs/stream",
            post(handlers::runs::create_run_stream),
        )
        .route(
            "/threads/:thread_id/runs/wait",
            post(handlers::runs::create_run_wait),
        )
        .route(
            "/threads/:thread_id/runs/:run_id",
            get(handlers::runs::get_run).delete(handlers::runs::delete_run),
        )
        .route(
            "/threads/:thread_id/runs/:run_id/cancel",
            post(handlers::runs::cancel_run),
        )
        .route(
            "/threads/:thread_id/runs/:run_id/join",
            get(handlers::runs::join_run),
        )
        .route(
            "/threads/:thread_id/runs/:run_id/stream",
            get(handlers::runs::stream_run_reconnect),
        )
        // Runs (stateless)
        .route("/runs", post(handlers::runs::create_stateless_run))
        .route(
            "/runs/stream",
            post(handlers::runs::create_stateless_run_stream),
        )
        .route(
            "/runs/wait",
            post(handlers::runs::create_stateless_run_wait),
        )
        // Store
        .route(
            "/store/items",
            put(handlers::store::put_item)
                .get(handlers::store::get_item)
                .delete(handlers::store::delete_item),
        )
        .route("/store/items/search", post(handlers::store::search_items))
        .route("/store/namespaces", get(handlers::store::list_namespaces))
        // Crons
        .route("/runs/crons", post(handlers::crons::create_cron))
        .route("/runs/crons/search", post(handlers::crons::search_crons))
        .route("/runs/crons/count", post(handlers::crons::count_crons))
        .route(
            "/runs/crons/:cron_id",
            get(handlers::crons::get_cron).delete(handlers::crons::delete_cron),
        )
        // Middleware chain: auth -> metrics -> handler
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
