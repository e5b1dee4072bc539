pub mod config;

use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
};
use parley_api::{MAX_UPLOAD_BODY, upload};
use parley_gateway::Gateway;
use parley_gateway::connection::{self, MAX_FRAME_SIZE};
use parley_store::DiskMedia;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::Config;

/// HTTP surface: the chat socket, uploads, a health check and static files.
pub fn build_router(gateway: Gateway, media: Arc<DiskMedia>, static_dir: &Path) -> Router {
    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway);

    let upload_route = Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY))
        .with_state(media.clone());

    Router::new()
        .merge(ws_route)
        .merge(upload_route)
        .route("/ping", get(|| async { "pong" }))
        .nest_service("/uploads", ServeDir::new(media.dir()))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(gateway): State<Gateway>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| connection::handle_connection(socket, gateway))
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
