use std::time::Duration;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{health, metrics, push},
    state::AppState,
};
use crate::config::Settings;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the push router; at most `max_concurrent_events` deliveries run at once
pub fn router(state: AppState, max_concurrent_events: usize) -> Router {
    Router::new()
        .route(
            "/",
            post(push).layer(ConcurrencyLimitLayer::new(max_concurrent_events)),
        )
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        // Automatically decompress gzip request bodies
        .layer(RequestDecompressionLayer::new())
}

pub async fn run(settings: Settings) -> Result<(), AnyError> {
    let state = AppState::from_settings(&settings)?;

    let watcher = state
        .resolver
        .spawn_watcher(Duration::from_secs(settings.rules.reload_interval_secs));

    let app = router(state, settings.server.max_concurrent_events);

    let address = settings.server.bind_addr;
    let listener = TcpListener::bind(address).await?;
    info!(%address, "filegate push endpoint listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(watcher) = watcher {
        watcher.abort();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
