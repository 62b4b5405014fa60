//! Axum server setup and router construction.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::error;

use crate::api::{self, AppState};
use crate::ws;

/// Build the full axum router.
///
/// The router serves:
/// - WebSocket at `/ws/{id}`
/// - REST API at `/api/*`
/// - Optional static files for the chat page
pub fn build_router(app: AppState, static_dir: Option<PathBuf>) -> Router {
    // CORS layer for development (page served from a different port).
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/ws/{id}", get(ws::ws_upgrade))
        .route("/api/status", get(api::get_status))
        .route("/api/exercises", get(api::get_exercises))
        .route("/api/sessions", post(api::create_session))
        .route(
            "/api/sessions/{id}",
            get(api::get_session).delete(api::delete_session),
        )
        .route("/api/sessions/{id}/chat", post(api::post_chat))
        .route("/api/sessions/{id}/reset", post(api::post_reset))
        .route("/api/sessions/{id}/credential", post(api::post_credential))
        .with_state(app)
        .layer(cors);

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
}

/// Bind, spawn the server task and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> Result<SocketAddr, String> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| format!("failed to bind {bind_addr}: {e}"))?;
    let addr = listener
        .local_addr()
        .map_err(|e| format!("failed to read bound address: {e}"))?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Web server stopped: {e}");
        }
    });

    Ok(addr)
}
