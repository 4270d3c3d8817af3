//! Runtime server binary.
//!
//! Reads configuration from the environment, connects the database, runs
//! migrations, syncs catalog assistants, restores cron timers, and serves
//! the API until SIGTERM/CTRL-C.

use std::net::SocketAddr;
use std::sync::Arc;

use runtime_server::api::routes::{create_router, AppState};
use runtime_server::config::RuntimeConfig;
use runtime_server::db::DatabaseConnection;
use runtime_server::registry::GraphRegistry;
use runtime_server::sync;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let config = Arc::new(RuntimeConfig::from_env());
    tracing::info!(
        database_url = %config.database_url,
        auth = config.identity.is_some(),
        observability = config.observability.is_some(),
        "configuration loaded"
    );
    if config.is_dev_mode() {
        tracing::warn!("no identity provider configured, running in dev mode (all requests are anonymous)");
    }

    tracing::info!("connecting to database");
    let db = DatabaseConnection::new(&config.database_url, config.database_max_connections).await?;

    tracing::info!("running database migrations");
    db.run_migrations().await?;
    db.health_check().await?;

    let registry = Arc::new(GraphRegistry::with_builtin_graphs());
    tracing::info!(graphs = ?registry.graph_ids(), "graph registry ready");

    // Startup assistant sync; failures never abort boot.
    sync::sync_assistants(&db, &config).await;

    let state = AppState::new(db, config.clone(), registry);
    state.scheduler.restore().await;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let app = create_router(state);

    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("runtime server shut down gracefully");
    Ok(())
}

/// Resolve on CTRL-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received CTRL-C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}
