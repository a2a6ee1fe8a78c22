//! Axum router configuration with middleware.
//!
//! REST routes live under `/api/v1/`, sockets under `/ws/`.
//! Middleware: CORS, request tracing.
//!
//! When a web directory is configured (`server.web_dir` or
//! `SUPPORTDESK_WEB_DIR`) and exists, the chat UI is served from it; unknown
//! paths fall through to its `index.html`.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use supportdesk_core::chat::store::ChatStore;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router<S: ChatStore + 'static>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let web_dir = std::env::var("SUPPORTDESK_WEB_DIR")
        .ok()
        .or_else(|| state.config.server.web_dir.clone());

    let api_routes = Router::new()
        .route("/sessions", get(handlers::session::list_sessions::<S>))
        .route("/sessions/{id}", get(handlers::session::get_session::<S>))
        .route("/sessions/{id}/read", post(handlers::session::mark_read::<S>))
        .route(
            "/sessions/{id}/messages",
            post(handlers::session::send_reply::<S>),
        )
        .route("/broadcast", post(handlers::broadcast::broadcast::<S>));

    let ws_routes = Router::new()
        .route("/guest", get(handlers::ws::guest::guest_ws_handler::<S>))
        .route("/admin", get(handlers::ws::admin::admin_ws_handler::<S>));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .nest("/ws", ws_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if let Some(web_dir) = web_dir.filter(|dir| std::path::Path::new(dir).exists()) {
        let index_path = format!("{web_dir}/index.html");
        let serve_dir = ServeDir::new(&web_dir).fallback(ServeFile::new(index_path));
        router = router.fallback_service(serve_dir);
        tracing::info!(path = %web_dir, "static UI serving enabled");
    }

    router
}

/// GET /health
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
