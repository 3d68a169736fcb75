pub mod handlers;
pub mod routes;
pub mod state;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::WebConfig;
use state::AppState;

const REAP_INTERVAL: Duration = Duration::from_secs(60);

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(config: WebConfig, state: Arc<AppState>) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let max_idle = Duration::from_secs(config.session_idle_secs);
    tokio::spawn(reap_sessions(Arc::clone(&state), max_idle, shutdown_rx));

    let served = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    let _ = shutdown_tx.send(true);
    served
}

/// Drops idle sessions once a minute until shutdown.
async fn reap_sessions(
    state: Arc<AppState>,
    max_idle: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let max_idle = chrono::Duration::from_std(max_idle).unwrap_or(chrono::Duration::MAX);
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                state.reap_idle(chrono::Utc::now(), max_idle).await;
            }
            _ = shutdown.changed() => {
                debug!("Session reaper stopping");
                break;
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
